//! Relation edges between catalog records.

use std::collections::{BTreeMap, BTreeSet};

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct EdgeRow {
    source: String,
    target: String,
}

/// A relation table and the record tables on either side.
pub(crate) struct Edge {
    pub table: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

pub(crate) const GRANTS: Edge = Edge {
    table: "grants",
    from: "role",
    to: "permission",
};

pub(crate) const USES_BUNDLE: Edge = Edge {
    table: "uses_bundle",
    from: "role",
    to: "grant_bundle",
};

pub(crate) const CONTAINS: Edge = Edge {
    table: "contains",
    from: "grant_bundle",
    to: "permission",
};

pub(crate) const HAS_ROLE: Edge = Edge {
    table: "has_role",
    from: "profile",
    to: "role",
};

pub(crate) const HOLDS: Edge = Edge {
    table: "holds",
    from: "profile",
    to: "permission",
};

impl Edge {
    /// Make `targets` the complete set of edges leaving `source`.
    pub(crate) async fn replace<C: Connection>(
        &self,
        db: &Surreal<C>,
        source: Uuid,
        targets: &BTreeSet<Uuid>,
    ) -> Result<(), DbError> {
        let Edge { table, from, to } = self;
        let mut query = format!("DELETE {table} WHERE in = {from}:`{source}`;");
        for target in targets {
            query.push_str(&format!(" RELATE {from}:`{source}` -> {table} -> {to}:`{target}`;"));
        }
        db.query(query)
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn targets<C: Connection>(
        &self,
        db: &Surreal<C>,
        source: Uuid,
    ) -> Result<BTreeSet<Uuid>, DbError> {
        let Edge { table, from, .. } = self;
        let mut result = db
            .query(format!(
                "SELECT meta::id(in) AS source, meta::id(out) AS target FROM {table} \
                 WHERE in = {from}:`{source}`"
            ))
            .await?;
        let rows: Vec<EdgeRow> = result.take(0)?;
        rows.iter().map(|r| parse_uuid(&r.target, self.to)).collect()
    }

    /// Every edge of the table, grouped by source.
    pub(crate) async fn all<C: Connection>(
        &self,
        db: &Surreal<C>,
    ) -> Result<BTreeMap<Uuid, BTreeSet<Uuid>>, DbError> {
        let mut result = db
            .query(format!(
                "SELECT meta::id(in) AS source, meta::id(out) AS target FROM {}",
                self.table
            ))
            .await?;
        let rows: Vec<EdgeRow> = result.take(0)?;
        let mut grouped: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        for row in rows {
            grouped
                .entry(parse_uuid(&row.source, self.from)?)
                .or_default()
                .insert(parse_uuid(&row.target, self.to)?);
        }
        Ok(grouped)
    }

    /// Statement removing every edge touching a record of `self.from` or
    /// `self.to` with the given id. Batched into the caller's delete.
    pub(crate) fn detach_statement(&self, table: &str, id: Uuid) -> String {
        let side = if table == self.from { "in" } else { "out" };
        format!("DELETE {} WHERE {side} = {table}:`{id}`;", self.table)
    }
}
