use tokenkeeper::settings::*;

// $ cargo run --bin settings_demo -- --settings=settings/release.toml
// $ TOKENKEEPER__TOKEN__BACKEND=file cargo run --bin settings_demo
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    println!("Loaded settings: {:#?}", project_settings);
    println!(
        "Token config: {:#?}",
        project_settings.token.to_token_config()
    );
    Ok(())
}
