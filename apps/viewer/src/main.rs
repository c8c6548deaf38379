fn main() {
    camwall_lib::run()
}
