//! CRUD server over the inventory tables, mounted under `/api/v1`.

pub mod handlers;

use crate::store::models::{
    Computer, Disk, Memory, NetworkAdapter, Processor, Software, SoftwareDependency,
    SoftwareUpdate, Ticket,
};
use crate::store::repo::{ChildEntity, Entity};
use crate::store::DbPool;
use axum::routing::{get, put};
use axum::Router;
use clap::ValueEnum;

/// Which entity groups a server instance exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ApiGroup {
    #[default]
    All,
    Hardware,
    Software,
    Tickets,
}

pub fn build_router(db: DbPool, group: ApiGroup) -> Router {
    let api = match group {
        ApiGroup::All => hardware_routes()
            .merge(software_routes())
            .merge(ticket_routes()),
        ApiGroup::Hardware => hardware_routes(),
        ApiGroup::Software => software_routes(),
        ApiGroup::Tickets => ticket_routes(),
    };
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .nest("/api/v1", api)
        .with_state(db)
}

fn crud<E: Entity>(router: Router<DbPool>, base: &str) -> Router<DbPool> {
    router
        .route(base, get(handlers::list::<E>).post(handlers::create::<E>))
        .route(
            &format!("{base}/:id"),
            get(handlers::get_one::<E>)
                .put(handlers::update::<E>)
                .delete(handlers::delete::<E>),
        )
}

fn children<E: ChildEntity>(router: Router<DbPool>, path: &str) -> Router<DbPool> {
    router.route(path, get(handlers::list_children::<E>))
}

fn hardware_routes() -> Router<DbPool> {
    let router = crud::<Computer>(Router::new(), "/computers");
    let router = crud::<Processor>(router, "/processors");
    let router = crud::<Memory>(router, "/memory");
    let router = crud::<Disk>(router, "/disks");
    let router = crud::<NetworkAdapter>(router, "/network-adapters");
    let router = children::<Processor>(router, "/computers/:id/processors");
    let router = children::<Memory>(router, "/computers/:id/memory");
    let router = children::<Disk>(router, "/computers/:id/disks");
    children::<NetworkAdapter>(router, "/computers/:id/network-adapters")
}

fn software_routes() -> Router<DbPool> {
    let router = crud::<Software>(Router::new(), "/software");
    let router = crud::<SoftwareUpdate>(router, "/updates");
    let router = crud::<SoftwareDependency>(router, "/dependencies");
    let router = children::<Software>(router, "/computers/:id/software");
    let router = children::<SoftwareUpdate>(router, "/software/:id/updates");
    children::<SoftwareDependency>(router, "/software/:id/dependencies")
}

fn ticket_routes() -> Router<DbPool> {
    Router::new()
        .route(
            "/tickets",
            get(handlers::list_tickets).post(handlers::create::<Ticket>),
        )
        .route(
            "/tickets/:id",
            get(handlers::get_one::<Ticket>)
                .put(handlers::update::<Ticket>)
                .delete(handlers::delete::<Ticket>),
        )
        .route("/tickets/:id/status", put(handlers::set_ticket_status))
}
