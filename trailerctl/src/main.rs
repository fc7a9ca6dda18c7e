use clap::Parser;

#[tokio::main]
async fn main() {
    trailerctl::init_tracing();
    let cli = trailerctl::Cli::parse();
    if let Err(err) = trailerctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
