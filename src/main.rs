fn main() {
    rollcall_lib::run()
}
