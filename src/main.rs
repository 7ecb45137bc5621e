fn main() {
    sigposture::entry::main();
}
