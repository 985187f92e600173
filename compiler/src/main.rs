use compiler::run_instrumenter;

fn main() {
    std::process::exit(run_instrumenter(std::env::args_os()));
}
