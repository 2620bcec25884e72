fn main() {
    if let Err(err) = accident_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
