//! Typed access to one resource through the controller.

use serde_json::Value;
use std::marker::PhantomData;

use super::controller::SyncController;
use super::mutation::{Mutation, MutationKind};
use super::result::QueryResult;
use crate::cache::{KeyParam, QueryKey};
use crate::entity::{project_one, project_rows, EntityRow, Resource, ResourceInfo};
use crate::error::Result;
use crate::remote::Payload;

/// List and detail reads of `R`, projected into display rows, and its writes
/// with the affected cache keys filled in.
pub struct EntityClient<R: Resource> {
  controller: SyncController,
  _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for EntityClient<R> {
  fn clone(&self) -> Self {
    Self::new(self.controller.clone())
  }
}

impl<R: Resource> EntityClient<R> {
  pub fn new(controller: SyncController) -> Self {
    Self {
      controller,
      _resource: PhantomData,
    }
  }

  pub fn controller(&self) -> &SyncController {
    &self.controller
  }

  pub fn list_key<K, V>(params: impl IntoIterator<Item = (K, V)>) -> QueryKey
  where
    K: Into<String>,
    V: Into<KeyParam>,
  {
    QueryKey::list(R::NAME, params)
  }

  pub fn detail_key(id: impl Into<String>) -> QueryKey {
    QueryKey::detail(R::NAME, id)
  }

  pub async fn list<K, V>(&self, params: impl IntoIterator<Item = (K, V)>) -> QueryResult<Vec<EntityRow<R::Row>>>
  where
    K: Into<String>,
    V: Into<KeyParam>,
  {
    let key = Self::list_key(params);
    self.controller.query_with(&key, project_rows::<R>).await
  }

  /// Unfiltered list.
  pub async fn all(&self) -> QueryResult<Vec<EntityRow<R::Row>>> {
    self.list(std::iter::empty::<(String, KeyParam)>()).await
  }

  pub async fn detail(&self, id: &str) -> QueryResult<EntityRow<R::Row>> {
    let key = Self::detail_key(id);
    self
      .controller
      .query(&key)
      .await
      .filter_map(|data| project_one::<R>(&data))
  }

  /// Refetch a list, bypassing freshness.
  pub async fn refetch_list<K, V>(
    &self,
    params: impl IntoIterator<Item = (K, V)>,
  ) -> QueryResult<Vec<EntityRow<R::Row>>>
  where
    K: Into<String>,
    V: Into<KeyParam>,
  {
    let key = Self::list_key(params);
    self.controller.refetch(&key).await.map(|data| project_rows::<R>(&data))
  }

  /// The mutation for `kind`, targeting every cached list of this resource
  /// and, for updates and deletes, the entity's detail entry.
  pub fn prepare(&self, kind: MutationKind) -> Mutation {
    self.controller.prepare(&ResourceInfo::of::<R>(), kind)
  }

  pub async fn run(&self, kind: MutationKind) -> Result<Value> {
    self.controller.mutate(self.prepare(kind)).await
  }

  pub async fn create(&self, payload: Payload) -> Result<Value> {
    self.run(MutationKind::Create { payload }).await
  }

  pub async fn update(&self, id: impl Into<String>, payload: Payload) -> Result<Value> {
    self
      .run(MutationKind::Update {
        id: id.into(),
        payload,
      })
      .await
  }

  pub async fn delete(&self, id: impl Into<String>) -> Result<Value> {
    self.run(MutationKind::Delete { id: id.into() }).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::resources::{Brand, Order, Product};
  use crate::cache::KeyFilter;
  use crate::entity::RowId;
  use crate::error::Error;
  use crate::remote::mock::MockRemote;
  use crate::sync::SyncOptions;
  use serde_json::json;
  use std::sync::Arc;

  fn controller(remote: MockRemote) -> (SyncController, Arc<MockRemote>) {
    let remote = Arc::new(remote);
    let controller = SyncController::with_remote(remote.clone(), SyncOptions::default());
    (controller, remote)
  }

  fn products() -> Value {
    json!([
      { "_id": "p1", "name": "Mug", "price": 12, "discountPrice": 9, "stock": "4" },
      { "_id": "p2", "name": "Card", "price": "3.5", "images": [{ "url": "https://img/card.png" }] }
    ])
  }

  #[tokio::test]
  async fn test_list_projects_rows() {
    let (controller, _) = controller(MockRemote::with_rows("product", products()));
    let client = EntityClient::<Product>::new(controller);

    let result = client.all().await;
    let rows = result.data.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, RowId::Key("p1".into()));
    assert_eq!(rows[0].fields.sale_price, 9.0);
    assert_eq!(rows[0].fields.stock, 4);
    assert_eq!(rows[1].fields.price, 3.5);
    assert_eq!(rows[1].fields.image, "https://img/card.png");
  }

  #[tokio::test]
  async fn test_detail_projects_one_row() {
    let (controller, remote) = controller(MockRemote::with_rows("product", products()));
    let client = EntityClient::<Product>::new(controller);

    let result = client.detail("p2").await;

    assert_eq!(result.data.unwrap().fields.name, "Card");
    assert_eq!(remote.call_count("get"), 1);
  }

  #[tokio::test]
  async fn test_missing_detail_is_an_error() {
    let (controller, _) = controller(MockRemote::with_rows("product", products()));
    let client = EntityClient::<Product>::new(controller);

    let result = client.detail("nope").await;

    assert!(result.data.is_none());
    assert_eq!(result.error.and_then(|e| e.status_code()), Some(404));
  }

  #[tokio::test]
  async fn test_filtered_lists_are_separate_entries() {
    let (controller, remote) = controller(MockRemote::with_rows("order", json!([{ "id": 1 }])));
    let client = EntityClient::<Order>::new(controller.clone());

    client.list([("page", 1i64)]).await;
    client.list([("page", 2i64)]).await;
    client.list([("page", 1i64)]).await;

    assert_eq!(remote.call_count("list"), 2);
    assert_eq!(controller.cache().len(), 2);
  }

  #[tokio::test]
  async fn test_prepare_targets_cached_lists_and_detail() {
    let (controller, _) = controller(MockRemote::with_rows("brand", json!([{ "_id": "b1" }])));
    let client = EntityClient::<Brand>::new(controller);
    client.all().await;
    client.list([("search", "ac")]).await;

    let m = client.prepare(MutationKind::Delete { id: "b1".into() });

    assert_eq!(m.target_keys.len(), 3);
    assert!(m.target_keys.contains(&QueryKey::all("brand")));
    assert!(m.target_keys.contains(&QueryKey::detail("brand", "b1")));
    assert_eq!(m.related, vec![KeyFilter::Lists("brand".into())]);
    assert_eq!(m.secondary_id.as_deref(), Some("_id"));
  }

  #[tokio::test]
  async fn test_delete_patches_list_and_detail() {
    let (controller, remote) = controller(MockRemote::with_rows("product", products()));
    let client = EntityClient::<Product>::new(controller.clone());
    client.all().await;
    client.detail("p1").await;

    client.delete("p1").await.unwrap();

    let list = controller.cache().read(&QueryKey::all("product")).unwrap();
    assert!(list.is_stale());
    assert_eq!(list.data.unwrap().as_array().map(Vec::len), Some(1));
    let detail = controller.cache().read(&QueryKey::detail("product", "p1")).unwrap();
    assert_eq!(detail.data, Some(Value::Null));
    assert_eq!(remote.rows("product").as_array().map(Vec::len), Some(1));
  }

  #[tokio::test]
  async fn test_failed_update_restores_rows() {
    let (controller, remote) = controller(MockRemote::with_rows("product", products()));
    let client = EntityClient::<Product>::new(controller);
    let before = client.all().await.data;

    remote.fail_next(
      "update",
      Error::Http {
        status_code: 422,
        body: "name taken".into(),
      },
    );
    let err = client
      .update("p2", Payload::new().field("name", "Mug"))
      .await
      .unwrap_err();

    assert_eq!(err.status_code(), Some(422));
    assert_eq!(client.all().await.data, before);
  }

  #[tokio::test]
  async fn test_create_then_list_shows_new_row() {
    let (controller, _) = controller(MockRemote::with_rows("brand", json!([])));
    let client = EntityClient::<Brand>::new(controller);
    client.all().await;

    client.create(Payload::new().field("name", "Acme")).await.unwrap();
    let rows = client
      .refetch_list(std::iter::empty::<(String, KeyParam)>())
      .await
      .data
      .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields.name, "Acme");
  }
}
