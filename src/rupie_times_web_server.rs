use crate::core::{AppConfig, EmailService, RedisHelper};
use crate::jobs::subscription_expiry::start_subscription_expiry_checker;
use crate::routes::rupie_times_routes;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{dev::Server, web::Data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub struct RupieWebServer {
    port: u16,
    server: Server,
}

impl RupieWebServer {
    pub async fn build(configuration: AppConfig) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            configuration.rupie_times_server_config.host,
            configuration.rupie_times_server_config.port
        );

        let pg_pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_lazy_with(configuration.postgres.connect());

        let redis = configuration.redis.connect();

        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        start_subscription_expiry_checker(
            pg_pool.clone(),
            configuration.billing.expire_soon_days,
        );

        let server = run(listener, pg_pool, redis, configuration).await?;

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub async fn run(
    listener: TcpListener,
    pg_pool: PgPool,
    redis_client: redis::Client,
    configuration: AppConfig,
) -> Result<Server, anyhow::Error> {
    let pg_pool = Data::new(pg_pool);
    let redis_client = Data::new(redis_client);
    let redis_helper = Data::new(RedisHelper::new(redis_client.clone()));
    let email_service = Data::new(EmailService::new(configuration.smtp.clone()));
    let configuration = Data::new(configuration);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
            ])
            .supports_credentials();
        App::new()
            .configure(rupie_times_routes)
            .app_data(pg_pool.clone())
            .app_data(redis_client.clone())
            .app_data(redis_helper.clone())
            .app_data(email_service.clone())
            .app_data(configuration.clone())
            .wrap(TracingLogger::default())
            .wrap(cors)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
