fn main() -> anyhow::Result<()> {
    env_logger::init();
    scriptport::run()
}
