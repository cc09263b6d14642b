fn main() -> anyhow::Result<()> {
    rollstat::runner::run()
}
