use clap::Parser;

fn main() {
    let cli = toxiq::app::Cli::parse();
    if let Err(err) = toxiq::run(cli) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
