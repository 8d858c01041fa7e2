// ABOUTME: Catalog storage layer using SQLite
// ABOUTME: CRUD for products, material modules, and materials plus counters

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::types::{
    Material, MaterialCreateInput, MaterialModule, ModuleCreateInput, ModuleStatus,
    ModuleUpdateInput, Product, ProductCreateInput, ProductStatus, ProductUpdateInput,
    MAX_MATERIALS_PER_MODULE,
};
use crate::storage::{StorageError, StorageResult};

pub struct CatalogStorage {
    pool: SqlitePool,
}

impl CatalogStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_product(
        &self,
        input: ProductCreateInput,
        created_by: &str,
    ) -> StorageResult<Product> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let status = input.status.unwrap_or_default();

        debug!("Creating product {} ({})", input.name, input.spu_code);

        sqlx::query(
            r#"
            INSERT INTO products (id, name, spu_code, description, style, demographic, status, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.spu_code)
        .bind(&input.description)
        .bind(&input.style)
        .bind(&input.demographic)
        .bind(status.as_str())
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if StorageError::is_unique_violation(&e) {
                StorageError::Duplicate("product SPU code")
            } else {
                StorageError::Sqlx(e)
            }
        })?;

        self.get_product(&id).await
    }

    pub async fn get_product(&self, id: &str) -> StorageResult<Product> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?
            .ok_or(StorageError::NotFound("product"))?;

        row_to_product(&row)
    }

    /// Paginated product listing, newest first. `only_active` scopes the
    /// public storefront view; `search` matches name or SPU code.
    pub async fn list_products_paginated(
        &self,
        only_active: bool,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StorageResult<(Vec<Product>, i64)> {
        let mut conditions: Vec<&str> = Vec::new();
        if only_active {
            conditions.push("status = 'active'");
        }
        if search.is_some() {
            conditions.push("(name LIKE ? OR spu_code LIKE ?)");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let pattern = search.map(|s| format!("%{s}%"));

        let count_sql = format!("SELECT COUNT(*) FROM products {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern).bind(pattern);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let list_sql = format!(
            "SELECT * FROM products {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(pattern) = &pattern {
            list_query = list_query.bind(pattern).bind(pattern);
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let products = rows
            .iter()
            .map(row_to_product)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok((products, total))
    }

    pub async fn update_product(
        &self,
        id: &str,
        input: ProductUpdateInput,
    ) -> StorageResult<Product> {
        let mut updates = vec!["updated_at = ?"];
        if input.name.is_some() {
            updates.push("name = ?");
        }
        if input.description.is_some() {
            updates.push("description = ?");
        }
        if input.style.is_some() {
            updates.push("style = ?");
        }
        if input.demographic.is_some() {
            updates.push("demographic = ?");
        }
        if input.status.is_some() {
            updates.push("status = ?");
        }

        let sql = format!("UPDATE products SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&sql).bind(Utc::now().to_rfc3339());
        if let Some(name) = &input.name {
            query = query.bind(name);
        }
        if let Some(description) = &input.description {
            query = query.bind(description);
        }
        if let Some(style) = &input.style {
            query = query.bind(style);
        }
        if let Some(demographic) = &input.demographic {
            query = query.bind(demographic);
        }
        if let Some(status) = &input.status {
            query = query.bind(status.as_str());
        }

        let result = query
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("product"));
        }

        self.get_product(id).await
    }

    pub async fn delete_product(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("product"));
        }

        debug!("Deleted product {}", id);
        Ok(())
    }

    pub async fn increment_view_count(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("UPDATE products SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("product"));
        }
        Ok(())
    }

    pub async fn increment_download_count(&self, id: &str) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE products SET download_count = download_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("product"));
        }
        Ok(())
    }

    pub async fn create_module(
        &self,
        product_id: &str,
        input: ModuleCreateInput,
    ) -> StorageResult<MaterialModule> {
        // The product must exist before hanging modules off it
        self.get_product(product_id).await?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let status = input.status.unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO material_modules (id, product_id, name, category, description, sort_order, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(&input.name)
        .bind(&input.category)
        .bind(&input.description)
        .bind(input.sort_order.unwrap_or(0))
        .bind(status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        self.get_module(&id).await
    }

    /// Fetch one module with its materials loaded
    pub async fn get_module(&self, id: &str) -> StorageResult<MaterialModule> {
        let row = sqlx::query("SELECT * FROM material_modules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?
            .ok_or(StorageError::NotFound("module"))?;

        let mut module = row_to_module(&row)?;
        module.materials = self.list_materials(id).await?;
        Ok(module)
    }

    /// All modules of a product with materials, in display order
    pub async fn list_modules(
        &self,
        product_id: &str,
        only_active: bool,
    ) -> StorageResult<Vec<MaterialModule>> {
        let sql = if only_active {
            "SELECT * FROM material_modules WHERE product_id = ? AND status = 'active' ORDER BY sort_order, created_at"
        } else {
            "SELECT * FROM material_modules WHERE product_id = ? ORDER BY sort_order, created_at"
        };

        let rows = sqlx::query(sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let mut modules = rows
            .iter()
            .map(row_to_module)
            .collect::<StorageResult<Vec<_>>>()?;

        // Single pass over the product's materials instead of a query per module
        let material_rows = sqlx::query(
            r#"
            SELECT m.* FROM materials m
            JOIN material_modules mm ON m.module_id = mm.id
            WHERE mm.product_id = ?
            ORDER BY m.sort_order, m.created_at
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let mut by_module: HashMap<String, Vec<Material>> = HashMap::new();
        for row in &material_rows {
            let material = row_to_material(row)?;
            by_module
                .entry(material.module_id.clone())
                .or_default()
                .push(material);
        }

        for module in &mut modules {
            if let Some(materials) = by_module.remove(&module.id) {
                module.materials = materials;
            }
        }

        Ok(modules)
    }

    pub async fn update_module(
        &self,
        id: &str,
        input: ModuleUpdateInput,
    ) -> StorageResult<MaterialModule> {
        let mut updates = vec!["updated_at = ?"];
        if input.name.is_some() {
            updates.push("name = ?");
        }
        if input.description.is_some() {
            updates.push("description = ?");
        }
        if input.sort_order.is_some() {
            updates.push("sort_order = ?");
        }
        if input.status.is_some() {
            updates.push("status = ?");
        }

        let sql = format!(
            "UPDATE material_modules SET {} WHERE id = ?",
            updates.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(Utc::now().to_rfc3339());
        if let Some(name) = &input.name {
            query = query.bind(name);
        }
        if let Some(description) = &input.description {
            query = query.bind(description);
        }
        if let Some(sort_order) = input.sort_order {
            query = query.bind(sort_order);
        }
        if let Some(status) = &input.status {
            query = query.bind(status.as_str());
        }

        let result = query
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("module"));
        }

        self.get_module(id).await
    }

    pub async fn delete_module(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM material_modules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("module"));
        }

        debug!("Deleted module {}", id);
        Ok(())
    }

    /// Register material metadata under a module, enforcing the per-module cap
    pub async fn add_material(
        &self,
        module_id: &str,
        input: MaterialCreateInput,
    ) -> StorageResult<Material> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM material_modules WHERE id = ?")
                .bind(module_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::Sqlx)?;
        if exists.is_none() {
            return Err(StorageError::NotFound("module"));
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM materials WHERE module_id = ?")
            .bind(module_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

        if count >= MAX_MATERIALS_PER_MODULE {
            return Err(StorageError::InvalidState(format!(
                "module already holds the maximum of {MAX_MATERIALS_PER_MODULE} materials"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO materials (id, module_id, filename, file_path, file_size, width, height, sort_order, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(module_id)
        .bind(&input.filename)
        .bind(&input.file_path)
        .bind(input.file_size)
        .bind(input.width)
        .bind(input.height)
        .bind(input.sort_order.unwrap_or(0))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_material(&id).await
    }

    pub async fn get_material(&self, id: &str) -> StorageResult<Material> {
        let row = sqlx::query("SELECT * FROM materials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?
            .ok_or(StorageError::NotFound("material"))?;

        row_to_material(&row)
    }

    pub async fn list_materials(&self, module_id: &str) -> StorageResult<Vec<Material>> {
        let rows = sqlx::query(
            "SELECT * FROM materials WHERE module_id = ? ORDER BY sort_order, created_at",
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_material).collect()
    }

    pub async fn delete_material(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM materials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("material"));
        }
        Ok(())
    }
}

fn parse_ts(value: String, column: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Database(format!("invalid {column}: {e}")))
}

fn row_to_product(row: &SqliteRow) -> StorageResult<Product> {
    let status: String = row.try_get("status")?;

    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        spu_code: row.try_get("spu_code")?,
        description: row.try_get("description")?,
        style: row.try_get("style")?,
        demographic: row.try_get("demographic")?,
        status: ProductStatus::from_str(&status).map_err(StorageError::Database)?,
        created_by: row.try_get("created_by")?,
        view_count: row.try_get("view_count")?,
        download_count: row.try_get("download_count")?,
        created_at: parse_ts(row.try_get("created_at")?, "created_at")?,
        updated_at: parse_ts(row.try_get("updated_at")?, "updated_at")?,
    })
}

fn row_to_module(row: &SqliteRow) -> StorageResult<MaterialModule> {
    let status: String = row.try_get("status")?;

    Ok(MaterialModule {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        sort_order: row.try_get("sort_order")?,
        status: ModuleStatus::from_str(&status).map_err(StorageError::Database)?,
        materials: Vec::new(),
        created_at: parse_ts(row.try_get("created_at")?, "created_at")?,
        updated_at: parse_ts(row.try_get("updated_at")?, "updated_at")?,
    })
}

fn row_to_material(row: &SqliteRow) -> StorageResult<Material> {
    Ok(Material {
        id: row.try_get("id")?,
        module_id: row.try_get("module_id")?,
        filename: row.try_get("filename")?,
        file_path: row.try_get("file_path")?,
        file_size: row.try_get("file_size")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        sort_order: row.try_get("sort_order")?,
        created_at: parse_ts(row.try_get("created_at")?, "created_at")?,
    })
}
