fn main() -> anyhow::Result<()> {
    wyoming_asr::run()
}
