use tracenet::runner::run_with_args;

fn main() {
    if let Err(error) = run_with_args() {
        eprintln!("tracenet: {error}");
        std::process::exit(1);
    }
}
