use pf_database::Database;
use pf_server::compose;
use pf_sweeper::Sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pf_core::log();
    let settings = pf_core::Settings::from_env();
    let database = Database::from_env();

    // Idempotent DDL bootstrap; safe on every startup.
    let client = database.session().await?;
    pf_records::create_tables(&client).await?;
    drop(client);

    let state = compose(settings, database.clone(), None, None);

    // The sweeper runs beside the HTTP server and stops with it.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = Sweeper::new(
        state.ctx.clone(),
        database,
        state.qf_backup(),
        state.ir_backup(),
    );
    let sweep_task = tokio::spawn(sweeper.run(shutdown_rx));

    let outcome = pf_server::run(state).await;

    let _ = shutdown_tx.send(true);
    let _ = sweep_task.await;
    outcome.map_err(Into::into)
}
