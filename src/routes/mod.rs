use actix_web::web::{scope, ServiceConfig};
use actix_web::Scope;
use payments::verify_payment;
use products::get_products;
use subscriptions::{get_my_subscriptions, get_subscription_status};

mod health_check;
mod payments;
mod products;
mod subscriptions;

use crate::routes::health_check::*;

fn util_routes() -> Scope {
    scope("").service(health_check)
}

fn payments_routes() -> Scope {
    scope("payments").service(verify_payment)
}

fn subscriptions_routes() -> Scope {
    scope("subscriptions")
        .service(get_my_subscriptions)
        .service(get_subscription_status)
}

fn products_routes() -> Scope {
    scope("products").service(get_products)
}

pub fn rupie_times_routes(conf: &mut ServiceConfig) {
    conf.service(
        scope("api/v1")
            .service(payments_routes())
            .service(subscriptions_routes())
            .service(products_routes())
            .service(util_routes()),
    );
}
