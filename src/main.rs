fn main() {
    if let Err(e) = agentdesk::cli::main() {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}
