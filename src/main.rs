fn main() {
    binacoco::init_logging();

    if let Err(e) = binacoco::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
