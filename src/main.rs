use colored::Colorize;

fn main() {
    if let Err(err) = doctl_serverless::run() {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}
