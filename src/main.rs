fn main() -> anyhow::Result<()> {
    scratchpad::cli::run()
}
