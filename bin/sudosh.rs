fn main() {
    sudosh_rs::sudosh_main()
}
