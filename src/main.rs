fn main() {
    if let Err(err) = vizbind::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
