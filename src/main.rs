fn main() {
    dotenv::dotenv().ok();

    if let Err(e) = course_billing::run() {
        eprintln!("course-billing failed to start: {}", e);
        std::process::exit(1);
    }
}
