fn main() -> anyhow::Result<()> {
    mepak::cli::run_cli()
}
