fn main() {
    if let Err(e) = patho_billing_lib::run() {
        eprintln!("patho-billing: {e}");
        std::process::exit(1);
    }
}
