use actix_web::web::Data;
use actix_web::{middleware::Logger, App, HttpServer};
use log::{error, info};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Transaction};

use tally::config::Config;
use tally::database::sqlx::{PgSqlx, PgSqlxManager};
use tally::error::Error;
use tally::handlers;

type Db = PgSqlx<PoolConnection<Postgres>>;
type Tx = PgSqlx<Transaction<'static, Postgres>>;

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;
    let manager = PgSqlxManager::connect(&config).await?;
    if config.run_migrations {
        manager.migrate().await?;
    }
    let manager = Data::new(manager);
    info!("listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(manager.clone())
            .configure(handlers::configure::<PgSqlxManager, Db, Tx>)
    })
    .bind(&config.bind_addr)
    .map_err(|e| Error::Config(format!("can not bind {}: {}", config.bind_addr, e)))?
    .run()
    .await
    .map_err(|e| Error::ServerError(e.to_string()))
}

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info,sqlx=warn")).init();
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
