//! Customer subcommands, generic over any [`CustomerStore`].
//!
//! Each command returns the JSON document the binary prints.

use anyhow::{Context as _, bail};
use clap::{Args, Subcommand};
use patron_core::{
  customer::{Actor, NewCustomer},
  identity::Identity,
  store::CustomerStore,
};
use serde_json::{Value, json};
use uuid::Uuid;

/// The three identifying fields, all required.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
  #[arg(long)]
  pub phone:       String,
  #[arg(long)]
  pub email:       String,
  #[arg(long)]
  pub national_id: String,
}

impl From<IdentityArgs> for Identity {
  fn from(args: IdentityArgs) -> Self {
    Identity::new(args.phone, args.email, args.national_id)
  }
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
  #[command(flatten)]
  pub identity:   IdentityArgs,
  #[arg(long)]
  pub first_name: Option<String>,
  #[arg(long)]
  pub last_name:  Option<String>,
  /// Free-form attributes as a JSON object.
  #[arg(long, value_parser = parse_attributes)]
  pub attributes: Option<Value>,
}

fn parse_attributes(raw: &str) -> Result<Value, String> {
  match serde_json::from_str(raw) {
    Ok(value @ Value::Object(_)) => Ok(value),
    Ok(_) => Err("attributes must be a JSON object".to_string()),
    Err(e) => Err(e.to_string()),
  }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CustomerCommand {
  /// Create an active customer.
  Create(CreateArgs),
  /// Show one customer, active or not.
  Get { id: Uuid },
  /// List active customers, oldest first.
  List {
    /// Include soft-deleted customers.
    #[arg(long)]
    all: bool,
  },
  /// Find the active customer holding an identity.
  Lookup(IdentityArgs),
  /// Soft-delete a customer, freeing its identity.
  Delete { id: Uuid },
  /// Restore a soft-deleted customer.
  Restore { id: Uuid },
  /// Permanently remove a customer and its history.
  Purge {
    id:  Uuid,
    /// Confirm the irreversible removal.
    #[arg(long)]
    yes: bool,
  },
  /// Show a customer's lifecycle events.
  History { id: Uuid },
}

/// Run `command` against `store`, attributing writes to `actor`.
pub async fn run<S: CustomerStore>(
  store: &S,
  actor: Actor,
  command: CustomerCommand,
) -> anyhow::Result<Value> {
  let value = match command {
    CustomerCommand::Create(args) => {
      let mut input = NewCustomer::new(args.identity.into(), actor);
      input.first_name = args.first_name;
      input.last_name = args.last_name;
      if let Some(attributes) = args.attributes {
        input.attributes = attributes;
      }
      let customer = store
        .create(input)
        .await
        .context("failed to create customer")?;
      serde_json::to_value(customer)?
    }
    CustomerCommand::Get { id } => match store.get(id).await? {
      Some(customer) => serde_json::to_value(customer)?,
      None => bail!("customer not found: {id}"),
    },
    CustomerCommand::List { all } => serde_json::to_value(store.list(all).await?)?,
    CustomerCommand::Lookup(args) => {
      let found = store.find_active_by_identity(args.into()).await?;
      serde_json::to_value(found)?
    }
    CustomerCommand::Delete { id } => {
      let customer = store
        .soft_delete(id, actor)
        .await
        .with_context(|| format!("failed to delete customer {id}"))?;
      serde_json::to_value(customer)?
    }
    CustomerCommand::Restore { id } => {
      let customer = store
        .restore(id, actor)
        .await
        .with_context(|| format!("failed to restore customer {id}"))?;
      serde_json::to_value(customer)?
    }
    CustomerCommand::Purge { id, yes } => {
      if !yes {
        bail!("refusing to purge {id} without --yes");
      }
      store
        .hard_delete(id)
        .await
        .with_context(|| format!("failed to purge customer {id}"))?;
      tracing::info!(%id, %actor, "customer purged");
      json!({ "purged": id })
    }
    CustomerCommand::History { id } => serde_json::to_value(store.history(id).await?)?,
  };
  Ok(value)
}

#[cfg(test)]
mod tests {
  use patron_core::memory::MemoryStore;

  use super::*;

  fn identity() -> IdentityArgs {
    IdentityArgs {
      phone:       "+1 555 0100".to_string(),
      email:       "ada@example.com".to_string(),
      national_id: "AB123".to_string(),
    }
  }

  fn create() -> CustomerCommand {
    CustomerCommand::Create(CreateArgs {
      identity:   identity(),
      first_name: Some("Ada".to_string()),
      last_name:  None,
      attributes: Some(json!({ "tier": "gold" })),
    })
  }

  fn id_of(value: &Value) -> Uuid {
    value["customer_id"].as_str().unwrap().parse().unwrap()
  }

  #[tokio::test]
  async fn create_then_get() {
    let store = MemoryStore::default();
    let created = run(&store, Actor::new("ops"), create()).await.unwrap();
    assert_eq!(created["is_active"], true);
    assert_eq!(created["attributes"]["tier"], "gold");
    assert_eq!(created["created_by"], "ops");

    let fetched = run(&store, Actor::new("ops"), CustomerCommand::Get {
      id: id_of(&created),
    })
    .await
    .unwrap();
    assert_eq!(fetched, created);
  }

  #[tokio::test]
  async fn conflicting_restore_reports_the_domain_error() {
    let store = MemoryStore::default();
    let actor = Actor::new("ops");
    let first = id_of(&run(&store, actor.clone(), create()).await.unwrap());
    run(&store, actor.clone(), CustomerCommand::Delete { id: first })
      .await
      .unwrap();
    run(&store, actor.clone(), create()).await.unwrap();

    let err = run(&store, actor, CustomerCommand::Restore { id: first })
      .await
      .unwrap_err();
    let domain = err.downcast_ref::<patron_core::Error>().unwrap();
    assert!(domain.as_conflict().is_some());
  }

  #[tokio::test]
  async fn lookup_returns_null_when_nobody_holds_the_identity() {
    let store = MemoryStore::default();
    let found = run(&store, Actor::new("ops"), CustomerCommand::Lookup(identity()))
      .await
      .unwrap();
    assert_eq!(found, Value::Null);
  }

  #[tokio::test]
  async fn purge_requires_confirmation() {
    let store = MemoryStore::default();
    let actor = Actor::new("ops");
    let id = id_of(&run(&store, actor.clone(), create()).await.unwrap());

    let refused = run(&store, actor.clone(), CustomerCommand::Purge { id, yes: false }).await;
    assert!(refused.is_err());
    assert!(store.get(id).await.unwrap().is_some());

    run(&store, actor, CustomerCommand::Purge { id, yes: true })
      .await
      .unwrap();
    assert!(store.get(id).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn history_lists_transitions_in_order() {
    let store = MemoryStore::default();
    let actor = Actor::new("ops");
    let id = id_of(&run(&store, actor.clone(), create()).await.unwrap());
    run(&store, actor.clone(), CustomerCommand::Delete { id })
      .await
      .unwrap();
    run(&store, actor.clone(), CustomerCommand::Restore { id })
      .await
      .unwrap();

    let history = run(&store, actor, CustomerCommand::History { id })
      .await
      .unwrap();
    let kinds: Vec<_> = history
      .as_array()
      .unwrap()
      .iter()
      .map(|e| e["kind"].as_str().unwrap().to_string())
      .collect();
    assert_eq!(kinds, ["created", "soft_deleted", "restored"]);
  }

  #[test]
  fn attributes_must_be_an_object() {
    assert!(parse_attributes("{\"a\":1}").is_ok());
    assert!(parse_attributes("[1]").is_err());
    assert!(parse_attributes("not json").is_err());
  }
}
