//! Resource routes mounted at `/<name>`. Only enabled operations get a route; a known path
//! with a disabled method answers 405, a path with nothing enabled answers 404.

use crate::handlers::resource::{create, delete, list, merge_update, read, replace};
use crate::state::{Operations, ResourceState};
use axum::{routing::MethodRouter, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub fn resource_routes<T>(state: Arc<ResourceState<T>>, ops: Operations) -> Router
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let collection = format!("/{}", state.name);
    let collection_slash = format!("/{}/", state.name);
    let item = format!("/{}/:id", state.name);

    let mut collection_routes: MethodRouter<Arc<ResourceState<T>>> = MethodRouter::new();
    if ops.get {
        collection_routes = collection_routes.get(list::<T>);
    }
    if ops.create {
        collection_routes = collection_routes.post(create::<T>);
    }

    let mut item_routes: MethodRouter<Arc<ResourceState<T>>> = MethodRouter::new();
    if ops.get {
        item_routes = item_routes.get(read::<T>);
    }
    if ops.update {
        item_routes = item_routes.put(replace::<T>).post(merge_update::<T>);
    }
    if ops.delete {
        item_routes = item_routes.delete(delete::<T>);
    }

    let mut router = Router::new();
    if ops.get || ops.create {
        router = router
            .route(&collection, collection_routes.clone())
            .route(&collection_slash, collection_routes);
    }
    if ops.get || ops.update || ops.delete {
        router = router.route(&item, item_routes);
    }
    router.with_state(state)
}
