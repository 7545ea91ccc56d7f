fn main() {
    std::process::exit(faropt_cli::cli::cli_main());
}
