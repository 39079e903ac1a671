fn main() -> std::process::ExitCode {
    shop_crm_dashboard_lib::run()
}
