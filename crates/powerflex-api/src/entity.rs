// Generic object API
//
// The gateway exposes every storage object type (Volume, Device,
// StoragePool, Sds, ...) through the same URL scheme:
//
//   /types/{Entity}/instances                      list, create
//   /types/{Entity}/instances/action/{action}      type-level action
//   /instances/{Entity}::{id}                      read one
//   /instances/{Entity}::{id}/action/{action}      instance action
//   /instances/{Entity}::{id}/relationships/{rel}  related objects
//
// Resource modules hold an `Entity` handle and only decide which action
// and parameters map to their domain operation.

use serde_json::Value;
use tracing::debug;

use crate::client::Client;
use crate::error::{Error, Operation};
use crate::query::{FieldProjection, FilterSpec};
use crate::request::{ApiRequest, check_segment};

/// Handle on one gateway object type.
pub struct Entity<'a> {
    client: &'a Client,
    name: String,
}

impl Client {
    /// Handle for the object type `name` (e.g. `"Volume"`, `"Device"`).
    pub fn entity(&self, name: impl Into<String>) -> Entity<'_> {
        Entity {
            client: self,
            name: name.into(),
        }
    }
}

impl Entity<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Paths ────────────────────────────────────────────────────────

    fn collection_path(&self) -> Result<String, Error> {
        check_segment("entity name", &self.name)?;
        Ok(format!("/types/{}/instances", self.name))
    }

    fn instance_path(&self, id: &str) -> Result<String, Error> {
        check_segment("entity name", &self.name)?;
        check_segment("entity id", id)?;
        Ok(format!("/instances/{}::{id}", self.name))
    }

    fn action_path(&self, id: &str, action: &str) -> Result<String, Error> {
        check_segment("action", action)?;
        Ok(format!("{}/action/{action}", self.instance_path(id)?))
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// List instances, optionally filtered and projected.
    ///
    /// `GET /api/types/{Entity}/instances`
    pub async fn list(
        &self,
        filter: &FilterSpec,
        fields: &FieldProjection,
    ) -> Result<Vec<Value>, Error> {
        let request = ApiRequest::get(self.collection_path()?)
            .filter(filter.clone())
            .fields(fields.clone());
        debug!(entity = %self.name, "listing instances");
        self.client.execute_as(&request).await
    }

    /// Read one instance.
    ///
    /// `GET /api/instances/{Entity}::{id}`
    pub async fn get(&self, id: &str, fields: &FieldProjection) -> Result<Value, Error> {
        let request = ApiRequest::get(self.instance_path(id)?).fields(fields.clone());
        self.client.execute(&request).await
    }

    /// Objects of type `related` attached to instance `id`.
    ///
    /// `GET /api/instances/{Entity}::{id}/relationships/{related}`
    pub async fn related(
        &self,
        id: &str,
        related: &str,
        filter: &FilterSpec,
        fields: &FieldProjection,
    ) -> Result<Vec<Value>, Error> {
        check_segment("relationship", related)?;
        let path = format!("{}/relationships/{related}", self.instance_path(id)?);
        let request = ApiRequest::get(path)
            .filter(filter.clone())
            .fields(fields.clone());
        self.client.execute_as(&request).await
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Create an instance and return it as the gateway now reports it.
    ///
    /// `POST /api/types/{Entity}/instances`, then a read of the returned id.
    pub async fn create(&self, params: Value) -> Result<Value, Error> {
        let request = ApiRequest::post(self.collection_path()?).params(params);
        let created = self.client.execute(&request).await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Deserialization {
                message: format!("create {} response carries no id", self.name),
                body: created.to_string(),
            })?;
        debug!(entity = %self.name, id, "created instance");
        self.get(id, &FieldProjection::all()).await
    }

    /// Remove an instance via its `remove{Entity}` action.
    ///
    /// An instance that no longer exists is reported as `ResourceNotFound`.
    pub async fn delete(&self, id: &str, params: Value) -> Result<(), Error> {
        let action = format!("remove{}", self.name);
        let request = ApiRequest::post(self.action_path(id, &action)?)
            .params(params)
            .operation(Operation::Delete);
        self.client.execute(&request).await?;
        debug!(entity = %self.name, id, "removed instance");
        Ok(())
    }

    /// Run `action` on an instance and return the gateway's answer.
    ///
    /// `POST /api/instances/{Entity}::{id}/action/{action}`
    pub async fn action(&self, id: &str, action: &str, params: Value) -> Result<Value, Error> {
        let request = ApiRequest::post(self.action_path(id, action)?)
            .params(params)
            .operation(Operation::Action);
        self.client.execute(&request).await
    }

    /// Run an updating action (rename, set limits, ...) and return the
    /// instance as it looks afterwards.
    pub async fn modify(&self, id: &str, action: &str, params: Value) -> Result<Value, Error> {
        let request = ApiRequest::post(self.action_path(id, action)?)
            .params(params)
            .operation(Operation::Update);
        self.client.execute(&request).await?;
        self.get(id, &FieldProjection::all()).await
    }

    /// Run a type-level action such as `querySelectedStatistics`.
    ///
    /// `POST /api/types/{Entity}/instances/action/{action}`
    pub async fn type_action(&self, action: &str, params: Value) -> Result<Value, Error> {
        check_segment("action", action)?;
        let path = format!("{}/action/{action}", self.collection_path()?);
        let request = ApiRequest::post(path)
            .params(params)
            .operation(Operation::Action);
        self.client.execute(&request).await
    }
}
