use clap::Parser;
use tofino_mau_backend::config::Config;
use tofino_mau_backend::driver;

fn main() {
    let config = Config::parse();

    let filter = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match driver::run(config) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
