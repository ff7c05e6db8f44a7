use anyhow::Result;

use arbitrage_spy::cli::CliApp;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件
    dotenv::dotenv().ok();

    let matches = CliApp::build_cli().get_matches();
    let app = CliApp::new(CliApp::config_path(&matches))?;

    app.run(&matches).await
}
