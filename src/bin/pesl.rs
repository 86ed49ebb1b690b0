use pesl::{cli, logging};

fn main() {
    logging::init();
    std::process::exit(cli::execute(std::env::args_os()));
}
