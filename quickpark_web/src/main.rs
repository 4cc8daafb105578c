use std::{error::Error, net::SocketAddr, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use chrono::{Offset, Utc};
use eventstore::ClientSettings;
use quickpark::{
    application::{import_spots, ParkingService},
    domain::{
        parking::{ParkingSpotRepository, RandomSettlement},
        IdGeneratorTask, SystemClock,
    },
    infrastructure::{
        catalog::JsonFileSpotCatalog, identity::StaticTokenIdentityProvider,
        memory::MemoryParkingSpotRepository, parking::EventStoreParkingSpotRepository,
    },
    QuickparkConfig, Store,
};
use quickpark_web::{router, AppState};
use snowflake::SnowflakeIdGenerator;
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() {
    match QuickparkConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = serve(&config).await {
                error!("アプリケーションエラー: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("アプリケーションエラー: {}", error)
        }
    }
}

fn repository(config: &QuickparkConfig) -> Result<Arc<dyn ParkingSpotRepository>, Box<dyn Error>> {
    match &config.store {
        Store::Memory => {
            info!("インメモリストアを使用します");
            Ok(Arc::new(MemoryParkingSpotRepository::new()))
        }
        Store::EventStore { url } => {
            let settings = url.parse::<ClientSettings>()?;
            info!("EventStoreDBに接続します");
            Ok(Arc::new(EventStoreParkingSpotRepository::new(
                eventstore::Client::new(settings)?,
            )))
        }
    }
}

async fn serve(config: &QuickparkConfig) -> Result<(), Box<dyn Error>> {
    let repository = repository(config)?;
    if let Some(path) = &config.catalog.path {
        import_spots(&JsonFileSpotCatalog::new(path), repository.as_ref()).await?;
    }

    let offset = config.clock.offset().unwrap_or_else(|| {
        warn!(
            "タイムゾーンが不正です: {}分, UTCを使用します",
            config.clock.utc_offset_minutes
        );
        Utc.fix()
    });
    let service = ParkingService::new(
        repository,
        Arc::new(RandomSettlement::new(config.payment.success_rate)),
        Arc::new(SystemClock),
        IdGeneratorTask::spawn(SnowflakeIdGenerator::new(1, 1).into()),
    );
    let app = router(AppState {
        service,
        identity: Arc::new(StaticTokenIdentityProvider::new(&config.auth.tokens)),
        offset,
    });

    let addr = config.server.address.parse::<SocketAddr>()?;
    match &config.server.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!("HTTPSで待ち受けます: {}", addr);
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("HTTPで待ち受けます: {}", addr);
            axum::Server::bind(&addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}
