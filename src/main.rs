fn main() {
    fotoreportage_lib::run()
}
