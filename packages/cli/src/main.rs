#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cube_cli::run_server().await
}
