//! chainstep binary entry point

use chainstep_cli::output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = chainstep_cli::run().await {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
