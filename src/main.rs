use std::fmt::{Debug, Display};

use rupie_times::core::{get_subscriber, init_subscriber, rolling_log_sink, AppConfig};
use rupie_times::rupie_times_web_server::RupieWebServer;
use tokio::task::JoinError;

use colored::*;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let file_appender = rolling_log_sink("rupie_times");

    let subscriber = get_subscriber("rupie_times".into(), "info".into(), file_appender);
    init_subscriber(subscriber);

    let config = AppConfig::new().expect("cant build our appConfig object");

    let rupie_times_web_server = RupieWebServer::build(config.clone())
        .await
        .expect("application could run for some obvious reasons");

    let _x = tokio::spawn(rupie_times_web_server.run_until_stopped());

    println!("{}", "-----------------------------------------".green());
    println!(
        "{}",
        format!(
            "🚀 Server started on Addr: {}:{}",
            config.rupie_times_server_config.host, config.rupie_times_server_config.port
        )
    );
    println!("{}", "-----------------------------------------".green());

    tokio::select! {
        o = _x => {report_exit("xx", o);}
    }
    Ok(())
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{} has exited", task_name)
        }
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} failed",
                task_name
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{}' task failed to complete",
                task_name
            )
        }
    }
}
