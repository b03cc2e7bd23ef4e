fn main() {
    if let Err(code) = docpipe_cli::run() {
        std::process::exit(code.as_i32());
    }
}
