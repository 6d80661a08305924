fn main() {
    clipshelf_lib::run()
}
