// ABOUTME: Selection storage layer and state machine over SQLite
// ABOUTME: Race-safe draft creation, guarded choice writes, and completion

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::types::{
    DownloadHistoryEntry, DownloadStats, Selection, SelectionStatus, StatsRange,
};
use crate::storage::{StorageError, StorageResult};

pub struct SelectionStorage {
    pool: SqlitePool,
}

impl SelectionStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent draft lookup or creation for (user, product).
    ///
    /// Returns the selection and whether it was newly created. Concurrent
    /// callers are serialized by the partial unique index on
    /// (user_id, product_id) WHERE status = 'draft': the loser of an insert
    /// race falls back to reading the winner's row.
    pub async fn find_or_create_draft(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> StorageResult<(Selection, bool)> {
        let product_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM products WHERE id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Sqlx)?;

        match product_status.as_deref() {
            None => return Err(StorageError::NotFound("product")),
            Some("active") => {}
            Some(_) => {
                return Err(StorageError::InvalidState(
                    "product is not open for selection".to_string(),
                ))
            }
        }

        // Two attempts: a concurrent complete() can retire the draft between
        // our lookup and insert, in which case the second pass settles it.
        for _ in 0..2 {
            let existing = sqlx::query(
                "SELECT * FROM selections WHERE user_id = ? AND product_id = ? AND status = 'draft'",
            )
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

            if let Some(row) = existing {
                let selection = self.hydrate(row_to_selection(&row)?).await?;
                return Ok((selection, false));
            }

            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            let inserted = sqlx::query(
                r#"
                INSERT INTO selections (id, user_id, product_id, status, created_at, updated_at)
                VALUES (?, ?, ?, 'draft', ?, ?)
                "#,
            )
            .bind(&id)
            .bind(user_id)
            .bind(product_id)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => {
                    debug!("Created draft selection {} for user {}", id, user_id);
                    return Ok((self.get_selection(&id).await?, true));
                }
                Err(e) if StorageError::is_unique_violation(&e) => continue,
                Err(e) => return Err(StorageError::Sqlx(e)),
            }
        }

        Err(StorageError::Database(
            "draft selection raced repeatedly, retry".to_string(),
        ))
    }

    pub async fn get_selection(&self, id: &str) -> StorageResult<Selection> {
        let row = sqlx::query("SELECT * FROM selections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?
            .ok_or(StorageError::NotFound("selection"))?;

        self.hydrate(row_to_selection(&row)?).await
    }

    pub async fn list_selections_paginated(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StorageResult<(Vec<Selection>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM selections WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let rows = sqlx::query(
            "SELECT * FROM selections WHERE user_id = ? ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let mut selections = rows
            .iter()
            .map(row_to_selection)
            .collect::<StorageResult<Vec<_>>>()?;

        if !selections.is_empty() {
            let placeholders = vec!["?"; selections.len()].join(", ");
            let sql = format!(
                "SELECT selection_id, module_id, material_id FROM selection_choices WHERE selection_id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for selection in &selections {
                query = query.bind(&selection.id);
            }
            let choice_rows = query.fetch_all(&self.pool).await.map_err(StorageError::Sqlx)?;

            let mut by_selection: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
            for row in &choice_rows {
                let selection_id: String = row.try_get("selection_id")?;
                let module_id: String = row.try_get("module_id")?;
                let material_id: String = row.try_get("material_id")?;
                by_selection
                    .entry(selection_id)
                    .or_default()
                    .insert(module_id, material_id);
            }
            for selection in &mut selections {
                if let Some(choices) = by_selection.remove(&selection.id) {
                    selection.choices = choices;
                }
            }
        }

        Ok((selections, total))
    }

    /// Upsert one module -> material choice on a draft selection.
    ///
    /// Every write is conditional on `status = 'draft'` so a racing
    /// complete() can never be overwritten; module and material membership
    /// are validated against the current catalog first.
    pub async fn set_choice(
        &self,
        selection_id: &str,
        user_id: &str,
        module_id: &str,
        material_id: &str,
    ) -> StorageResult<Selection> {
        let selection = self.guard_draft_owner(selection_id, user_id).await?;

        let module_status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM material_modules WHERE id = ? AND product_id = ?",
        )
        .bind(module_id)
        .bind(&selection.product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        // Inactive modules are no longer part of the selectable catalog
        match module_status.as_deref() {
            Some("active") => {}
            _ => return Err(StorageError::NotFound("module")),
        }

        let material_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM materials WHERE id = ? AND module_id = ?")
                .bind(material_id)
                .bind(module_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Sqlx)?;
        if material_exists.is_none() {
            return Err(StorageError::NotFound("material"));
        }

        let now = Utc::now().to_rfc3339();

        // Update-then-insert, each statement guarded by the draft status.
        // A concurrent insert on the same module bounces the unique key and
        // gets settled by one retry of the update.
        for attempt in 0..2 {
            let updated = sqlx::query(
                r#"
                UPDATE selection_choices SET material_id = ?, updated_at = ?
                WHERE selection_id = ? AND module_id = ?
                AND EXISTS (SELECT 1 FROM selections WHERE id = ? AND status = 'draft')
                "#,
            )
            .bind(material_id)
            .bind(&now)
            .bind(selection_id)
            .bind(module_id)
            .bind(selection_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

            if updated.rows_affected() > 0 {
                break;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO selection_choices (selection_id, module_id, material_id, created_at, updated_at)
                SELECT ?, ?, ?, ?, ?
                WHERE EXISTS (SELECT 1 FROM selections WHERE id = ? AND status = 'draft')
                "#,
            )
            .bind(selection_id)
            .bind(module_id)
            .bind(material_id)
            .bind(&now)
            .bind(&now)
            .bind(selection_id)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(result) if result.rows_affected() > 0 => break,
                Ok(_) => {
                    return Err(StorageError::InvalidState(
                        "selection is already completed and read-only".to_string(),
                    ))
                }
                Err(e) if StorageError::is_unique_violation(&e) && attempt == 0 => continue,
                Err(e) => return Err(StorageError::Sqlx(e)),
            }
        }

        sqlx::query("UPDATE selections SET updated_at = ? WHERE id = ? AND status = 'draft'")
            .bind(&now)
            .bind(selection_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        self.get_selection(selection_id).await
    }

    /// Remove one module choice from a draft; absent entries are a no-op
    pub async fn remove_choice(
        &self,
        selection_id: &str,
        user_id: &str,
        module_id: &str,
    ) -> StorageResult<Selection> {
        self.guard_draft_owner(selection_id, user_id).await?;

        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            DELETE FROM selection_choices
            WHERE selection_id = ? AND module_id = ?
            AND EXISTS (SELECT 1 FROM selections WHERE id = ? AND status = 'draft')
            "#,
        )
        .bind(selection_id)
        .bind(module_id)
        .bind(selection_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        sqlx::query("UPDATE selections SET updated_at = ? WHERE id = ? AND status = 'draft'")
            .bind(&now)
            .bind(selection_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        self.get_selection(selection_id).await
    }

    /// Flip a draft to completed iff every currently active module of the
    /// product has a choice. The coverage check and the flip are one SQL
    /// statement, so catalog edits and duplicate completes cannot slip in
    /// between validation and transition.
    pub async fn complete(&self, selection_id: &str, user_id: &str) -> StorageResult<Selection> {
        let selection = self.guard_owner(selection_id, user_id).await?;
        if selection.status == SelectionStatus::Completed {
            return Err(StorageError::InvalidState(
                "selection is already completed".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();

        let flipped = sqlx::query(
            r#"
            UPDATE selections SET status = 'completed', completed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'draft'
            AND NOT EXISTS (
                SELECT 1 FROM material_modules mm
                WHERE mm.product_id = selections.product_id
                AND mm.status = 'active'
                AND mm.id NOT IN (
                    SELECT module_id FROM selection_choices WHERE selection_id = selections.id
                )
            )
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(selection_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        if flipped.rows_affected() > 0 {
            debug!("Selection {} completed", selection_id);
            return self.get_selection(selection_id).await;
        }

        // Nothing flipped: either coverage failed or the status raced
        let missing = self.missing_module_names(selection_id).await?;
        if !missing.is_empty() {
            return Err(StorageError::IncompleteSelection { missing });
        }

        let current = self.get_selection(selection_id).await?;
        if current.status == SelectionStatus::Completed {
            return Err(StorageError::InvalidState(
                "selection is already completed".to_string(),
            ));
        }

        Err(StorageError::Database(
            "selection completion raced, retry".to_string(),
        ))
    }

    /// Names of active modules without a choice, in display order
    pub async fn missing_module_names(&self, selection_id: &str) -> StorageResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT mm.name FROM material_modules mm
            JOIN selections s ON s.product_id = mm.product_id
            WHERE s.id = ?
            AND mm.status = 'active'
            AND mm.id NOT IN (
                SELECT module_id FROM selection_choices WHERE selection_id = s.id
            )
            ORDER BY mm.sort_order, mm.created_at
            "#,
        )
        .bind(selection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(rows)
    }

    /// Bump the download counter and stamp the last download time
    pub async fn record_download(&self, selection_id: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE selections
            SET download_count = download_count + 1, last_download_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(selection_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("selection"));
        }
        Ok(())
    }

    pub async fn download_history_paginated(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StorageResult<(Vec<DownloadHistoryEntry>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM selections WHERE user_id = ? AND download_count > 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let rows = sqlx::query(
            r#"
            SELECT s.id AS selection_id, s.product_id, p.name AS product_name, p.spu_code,
                   s.download_count, s.last_download_at
            FROM selections s
            JOIN products p ON p.id = s.product_id
            WHERE s.user_id = ? AND s.download_count > 0
            ORDER BY s.last_download_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(DownloadHistoryEntry {
                selection_id: row.try_get("selection_id")?,
                product_id: row.try_get("product_id")?,
                product_name: row.try_get("product_name")?,
                spu_code: row.try_get("spu_code")?,
                download_count: row.try_get("download_count")?,
                last_download_at: parse_ts(row.try_get("last_download_at")?, "last_download_at")?,
            });
        }

        Ok((entries, total))
    }

    /// Per-user download totals since the window start. RFC 3339 UTC strings
    /// compare lexicographically in time order, so the bound is a plain TEXT
    /// comparison.
    pub async fn download_stats(
        &self,
        user_id: &str,
        range: StatsRange,
    ) -> StorageResult<DownloadStats> {
        let since = range.period_start(Utc::now()).to_rfc3339();

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(download_count), 0) AS total_downloads,
                   COUNT(DISTINCT product_id) AS unique_products
            FROM selections
            WHERE user_id = ? AND download_count > 0 AND last_download_at >= ?
            "#,
        )
        .bind(user_id)
        .bind(&since)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(DownloadStats {
            total_downloads: row.try_get("total_downloads")?,
            unique_products: row.try_get("unique_products")?,
        })
    }

    async fn guard_owner(&self, selection_id: &str, user_id: &str) -> StorageResult<Selection> {
        let selection = self.get_selection(selection_id).await?;
        if selection.user_id != user_id {
            return Err(StorageError::Forbidden);
        }
        Ok(selection)
    }

    async fn guard_draft_owner(
        &self,
        selection_id: &str,
        user_id: &str,
    ) -> StorageResult<Selection> {
        let selection = self.guard_owner(selection_id, user_id).await?;
        if selection.status != SelectionStatus::Draft {
            return Err(StorageError::InvalidState(
                "selection is already completed and read-only".to_string(),
            ));
        }
        Ok(selection)
    }

    async fn hydrate(&self, mut selection: Selection) -> StorageResult<Selection> {
        let rows = sqlx::query(
            "SELECT module_id, material_id FROM selection_choices WHERE selection_id = ?",
        )
        .bind(&selection.id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        for row in &rows {
            let module_id: String = row.try_get("module_id")?;
            let material_id: String = row.try_get("material_id")?;
            selection.choices.insert(module_id, material_id);
        }

        Ok(selection)
    }
}

fn parse_ts(value: String, column: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Database(format!("invalid {column}: {e}")))
}

fn parse_ts_opt(value: Option<String>, column: &str) -> StorageResult<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(v, column)).transpose()
}

fn row_to_selection(row: &SqliteRow) -> StorageResult<Selection> {
    let status: String = row.try_get("status")?;

    Ok(Selection {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        status: SelectionStatus::from_str(&status).map_err(StorageError::Database)?,
        choices: BTreeMap::new(),
        download_count: row.try_get("download_count")?,
        last_download_at: parse_ts_opt(row.try_get("last_download_at")?, "last_download_at")?,
        completed_at: parse_ts_opt(row.try_get("completed_at")?, "completed_at")?,
        created_at: parse_ts(row.try_get("created_at")?, "created_at")?,
        updated_at: parse_ts(row.try_get("updated_at")?, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        CatalogStorage, MaterialCreateInput, ModuleCreateInput, ModuleStatus, ModuleUpdateInput,
        ProductCreateInput, ProductStatus,
    };
    use crate::test_utils::{seed_user, test_pool};

    struct Fixture {
        selections: SelectionStorage,
        catalog: CatalogStorage,
        user_id: String,
        product_id: String,
        module_ids: Vec<String>,
        material_ids: Vec<String>,
    }

    /// Product with two active modules, one material each
    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "buyer").await;
        let catalog = CatalogStorage::new(pool.clone());
        let selections = SelectionStorage::new(pool);

        let product = catalog
            .create_product(
                ProductCreateInput {
                    name: "Magic Cube Box".to_string(),
                    spu_code: "SPU-SEL".to_string(),
                    description: None,
                    style: None,
                    demographic: None,
                    status: Some(ProductStatus::Active),
                },
                &user_id,
            )
            .await
            .unwrap();

        let mut module_ids = Vec::new();
        let mut material_ids = Vec::new();
        for (i, name) in ["Cover", "Sticker"].iter().enumerate() {
            let module = catalog
                .create_module(
                    &product.id,
                    ModuleCreateInput {
                        name: name.to_string(),
                        category: name.to_lowercase(),
                        description: None,
                        sort_order: Some(i as i64),
                        status: None,
                    },
                )
                .await
                .unwrap();
            let material = catalog
                .add_material(
                    &module.id,
                    MaterialCreateInput {
                        filename: format!("{}.png", name.to_lowercase()),
                        file_path: format!("assets/{}.png", name.to_lowercase()),
                        file_size: 2048,
                        width: Some(1200),
                        height: Some(900),
                        sort_order: None,
                    },
                )
                .await
                .unwrap();
            module_ids.push(module.id);
            material_ids.push(material.id);
        }

        Fixture {
            selections,
            catalog,
            user_id,
            product_id: product.id,
            module_ids,
            material_ids,
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let fx = fixture().await;

        let (first, created) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.status, SelectionStatus::Draft);
        assert!(first.choices.is_empty());

        let (second, created) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_start_unknown_product() {
        let fx = fixture().await;
        let err = fx
            .selections
            .find_or_create_draft(&fx.user_id, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound("product")));
    }

    #[tokio::test]
    async fn test_draft_unique_index_blocks_second_insert() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        // A raw second draft insert must bounce off the partial unique index
        let now = Utc::now().to_rfc3339();
        let err = sqlx::query(
            "INSERT INTO selections (id, user_id, product_id, status, created_at, updated_at) VALUES (?, ?, ?, 'draft', ?, ?)",
        )
        .bind("dup-id")
        .bind(&draft.user_id)
        .bind(&draft.product_id)
        .bind(&now)
        .bind(&now)
        .execute(&fx.selections.pool)
        .await
        .unwrap_err();

        assert!(StorageError::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_set_choice_upserts() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        let selection = fx
            .selections
            .set_choice(&draft.id, &fx.user_id, &fx.module_ids[0], &fx.material_ids[0])
            .await
            .unwrap();
        assert_eq!(
            selection.choices.get(&fx.module_ids[0]),
            Some(&fx.material_ids[0])
        );

        // Replacing the choice for the same module keeps a single entry
        let other = fx
            .catalog
            .add_material(
                &fx.module_ids[0],
                MaterialCreateInput {
                    filename: "alt.png".to_string(),
                    file_path: "assets/alt.png".to_string(),
                    file_size: 100,
                    width: None,
                    height: None,
                    sort_order: None,
                },
            )
            .await
            .unwrap();
        let selection = fx
            .selections
            .set_choice(&draft.id, &fx.user_id, &fx.module_ids[0], &other.id)
            .await
            .unwrap();
        assert_eq!(selection.choices.len(), 1);
        assert_eq!(selection.choices.get(&fx.module_ids[0]), Some(&other.id));
    }

    #[tokio::test]
    async fn test_set_choice_validates_catalog_membership() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        let err = fx
            .selections
            .set_choice(&draft.id, &fx.user_id, "nope", &fx.material_ids[0])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound("module")));

        // Material from a different module is rejected too
        let err = fx
            .selections
            .set_choice(&draft.id, &fx.user_id, &fx.module_ids[0], &fx.material_ids[1])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound("material")));
    }

    #[tokio::test]
    async fn test_set_choice_forbidden_for_non_owner() {
        let fx = fixture().await;
        let stranger = seed_user(&fx.selections.pool, "stranger").await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        let err = fx
            .selections
            .set_choice(&draft.id, &stranger, &fx.module_ids[0], &fx.material_ids[0])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden));
    }

    #[tokio::test]
    async fn test_remove_choice_is_noop_when_absent() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        let selection = fx
            .selections
            .remove_choice(&draft.id, &fx.user_id, &fx.module_ids[0])
            .await
            .unwrap();
        assert!(selection.choices.is_empty());
    }

    #[tokio::test]
    async fn test_complete_names_missing_modules() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        fx.selections
            .set_choice(&draft.id, &fx.user_id, &fx.module_ids[0], &fx.material_ids[0])
            .await
            .unwrap();

        let err = fx
            .selections
            .complete(&draft.id, &fx.user_id)
            .await
            .unwrap_err();
        match err {
            StorageError::IncompleteSelection { missing } => {
                assert_eq!(missing, vec!["Sticker".to_string()]);
            }
            other => panic!("expected IncompleteSelection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_flips_and_is_terminal() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        for i in 0..2 {
            fx.selections
                .set_choice(&draft.id, &fx.user_id, &fx.module_ids[i], &fx.material_ids[i])
                .await
                .unwrap();
        }

        let completed = fx.selections.complete(&draft.id, &fx.user_id).await.unwrap();
        assert_eq!(completed.status, SelectionStatus::Completed);
        assert!(completed.completed_at.is_some());

        // Completed selections are read-only
        let err = fx
            .selections
            .set_choice(&draft.id, &fx.user_id, &fx.module_ids[0], &fx.material_ids[0])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidState(_)));

        let err = fx
            .selections
            .complete(&draft.id, &fx.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidState(_)));

        // And the mapping was not touched by the rejected write
        let current = fx.selections.get_selection(&draft.id).await.unwrap();
        assert_eq!(current.choices.len(), 2);
    }

    #[tokio::test]
    async fn test_complete_revalidates_against_current_catalog() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();

        for i in 0..2 {
            fx.selections
                .set_choice(&draft.id, &fx.user_id, &fx.module_ids[i], &fx.material_ids[i])
                .await
                .unwrap();
        }

        // A module added after the choices were made reopens the gap
        let late = fx
            .catalog
            .create_module(
                &fx.product_id,
                ModuleCreateInput {
                    name: "Backdrop".to_string(),
                    category: "backdrop".to_string(),
                    description: None,
                    sort_order: Some(9),
                    status: None,
                },
            )
            .await
            .unwrap();

        let err = fx
            .selections
            .complete(&draft.id, &fx.user_id)
            .await
            .unwrap_err();
        match err {
            StorageError::IncompleteSelection { missing } => {
                assert_eq!(missing, vec!["Backdrop".to_string()]);
            }
            other => panic!("expected IncompleteSelection, got {other:?}"),
        }

        // Deactivating it closes the gap again: catalog truth wins both ways
        fx.catalog
            .update_module(
                &late.id,
                ModuleUpdateInput {
                    status: Some(ModuleStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let completed = fx.selections.complete(&draft.id, &fx.user_id).await.unwrap();
        assert_eq!(completed.status, SelectionStatus::Completed);
    }

    #[tokio::test]
    async fn test_record_download_and_history() {
        let fx = fixture().await;
        let (draft, _) = fx
            .selections
            .find_or_create_draft(&fx.user_id, &fx.product_id)
            .await
            .unwrap();
        for i in 0..2 {
            fx.selections
                .set_choice(&draft.id, &fx.user_id, &fx.module_ids[i], &fx.material_ids[i])
                .await
                .unwrap();
        }
        fx.selections.complete(&draft.id, &fx.user_id).await.unwrap();

        let (history, total) = fx
            .selections
            .download_history_paginated(&fx.user_id, 10, 0)
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(history.is_empty());

        fx.selections.record_download(&draft.id).await.unwrap();
        fx.selections.record_download(&draft.id).await.unwrap();

        let (history, total) = fx
            .selections
            .download_history_paginated(&fx.user_id, 10, 0)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(history[0].download_count, 2);
        assert_eq!(history[0].spu_code, "SPU-SEL");

        let stats = fx
            .selections
            .download_stats(&fx.user_id, StatsRange::Daily)
            .await
            .unwrap();
        assert_eq!(
            stats,
            DownloadStats {
                total_downloads: 2,
                unique_products: 1
            }
        );
    }
}
