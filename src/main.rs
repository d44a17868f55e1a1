use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;

use anyhow::Result;
use clap::Parser;

use llama2_stream::checkpoint::load_checkpoint;
use llama2_stream::cpu::CpuKernels;
use llama2_stream::decoder::Decoder;
use llama2_stream::header::Header;
use llama2_stream::sampler::Sampler;
use llama2_stream::source::{DataSource, ReadChunks};
use llama2_stream::tokenizer::{SpecialToken, Tokenizer};
use llama2_stream::vocab::load_vocab;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "stories15M.bin")]
    checkpoint_path: String,

    #[arg(short, long, default_value = "tokenizer.bin")]
    tokenizer_path: String,

    #[arg(short, long, default_value = "")]
    prompt: String,

    /// overrides the checkpoint's maximum sequence length
    #[arg(short, long)]
    steps: Option<usize>,

    /// [0, inf)
    #[arg(short = 'T', long, default_value_t = 0.0)]
    temperature: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file = File::open(&args.checkpoint_path)?;
    let mut source = DataSource::new(ReadChunks::new(file));

    let header = Header::from_source(&mut source)?;
    let mut hyperparams = *header.hyperparams();

    // the override must land before kernel creation so the key/value caches
    // are sized to it
    if let Some(steps) = args.steps {
        hyperparams.max_sequence_length = steps;
    }

    let checkpoint = load_checkpoint(&mut source, &hyperparams, &CpuKernels)?;
    drop(source);

    let file = File::open(&args.tokenizer_path)?;
    let mut source = DataSource::new(ReadChunks::new(file));
    let vocab = load_vocab(&mut source, hyperparams.vocab_size)?;
    drop(source);

    let tokenizer = Tokenizer::new(vocab)?;
    let sampler = Sampler::new(args.temperature);
    let mut decoder = Decoder::new(hyperparams, checkpoint);

    let mut prompt_tokens: VecDeque<usize> = tokenizer.encode(&args.prompt, true, false).into();
    let mut next_token = prompt_tokens
        .pop_front()
        .unwrap_or(SpecialToken::Bos as usize);

    for position in 0..hyperparams.max_sequence_length {
        let token = next_token;
        let logits = decoder.forward(token, position, false);

        next_token = match prompt_tokens.pop_front() {
            Some(token_id) => token_id,
            None => sampler.sample(logits),
        };

        let Some(text) = tokenizer.decode(next_token, token) else {
            break;
        };

        print!("{text}");
        std::io::stdout().flush()?;
    }

    println!();

    Ok(())
}
