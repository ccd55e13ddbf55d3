//! Wayfare node runner binary.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    wayfare_node_commands::run().await
}
