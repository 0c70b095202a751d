pub async fn home_handler() -> &'static str {
    "admission-gate is running\n"
}
