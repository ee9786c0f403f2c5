use actix_web::web::{delete, get, patch, post, resource, scope, ServiceConfig};

use crate::engine::ports::repository::{Manager, Store, TxStore};

pub mod poll;

/// Mounts every route. The manager itself is registered by the caller as `Data<M>`.
pub fn configure<M, S, T>(cfg: &mut ServiceConfig)
where
    M: for<'m> Manager<'m, S, T> + 'static,
    S: Store + 'static,
    T: TxStore + 'static,
{
    cfg.service(
        scope("polls")
            .service(resource("").route(post().to(poll::create::<M, S, T>)).route(get().to(poll::list::<M, S, T>)))
            .service(resource("/{id}").route(get().to(poll::detail::<M, S, T>)).route(patch().to(poll::update::<M, S, T>)))
            .service(resource("/{id}/eligibility").route(get().to(poll::eligibility::<M, S, T>)))
            .service(resource("/{id}/votes").route(post().to(poll::cast::<M, S, T>)).route(delete().to(poll::retract::<M, S, T>)))
            .service(resource("/{id}/reconcile").route(post().to(poll::reconcile::<M, S, T>))),
    )
    .service(
        scope("tests")
            .service(resource("").route(post().to(test::create::<M, S, T>)))
            .service(resource("/{id}").route(get().to(test::detail::<M, S, T>)).route(delete().to(test::delete::<M, S, T>)))
            .service(resource("/{id}/attempts").route(post().to(test::submit::<M, S, T>)).route(get().to(test::attempts::<M, S, T>))),
    );
}
