fn main() {
    std::process::exit(monicom_lib::run())
}
