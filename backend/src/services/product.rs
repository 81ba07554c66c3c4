//! Product catalogue as far as the ledger needs it: SKU and box contents

use serde::Deserialize;
use shared::{
    validate_box_contents, ConversionTracker, InventoryError, MovementEngine, Product, ProductId,
    StockLedger,
};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::error::AppResult;
use crate::services::conversion::load_open_batches_for_product;

/// Product service for catalogue lookups and box-contents changes
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Input for registering a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub box_contents: i64,
}

/// Input for changing pairs per box
#[derive(Debug, Deserialize)]
pub struct UpdateBoxContentsInput {
    pub box_contents: i64,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    sku: String,
    name: String,
    category: Option<String>,
    box_contents: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId(row.id),
            sku: row.sku,
            name: row.name,
            category: row.category,
            box_contents: row.box_contents,
        }
    }
}

/// Read a product and hold it against box-contents changes until commit
pub async fn lock_product_for_share(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> AppResult<Product> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, sku, name, category, box_contents FROM products WHERE id = $1 FOR SHARE",
    )
    .bind(product_id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| InventoryError::not_found("product", product_id))?;

    Ok(row.into())
}

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_product(&self, product_id: ProductId) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, sku, name, category, box_contents FROM products WHERE id = $1",
        )
        .bind(product_id.0)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| InventoryError::not_found("product", product_id))?;

        Ok(row.into())
    }

    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<Product> {
        validate_box_contents(input.box_contents)
            .map_err(|message| InventoryError::invalid("box_contents", message))?;
        if input.sku.trim().is_empty() {
            return Err(InventoryError::invalid("sku", "must not be empty").into());
        }

        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            INSERT INTO products (sku, name, category, box_contents)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sku, name, category, box_contents
            "#,
        )
        .bind(input.sku.trim())
        .bind(&input.name)
        .bind(&input.category)
        .bind(input.box_contents)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(product_id = row.id, sku = %row.sku, "Product registered");
        Ok(row.into())
    }

    /// Change pairs per box; refused while any conversion batch of the
    /// product still has boxes pending
    pub async fn update_box_contents(
        &self,
        product_id: ProductId,
        input: UpdateBoxContentsInput,
    ) -> AppResult<Product> {
        let mut tx = self.db.begin().await?;

        let current: Product = sqlx::query_as::<_, ProductRow>(
            "SELECT id, sku, name, category, box_contents FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| InventoryError::not_found("product", product_id))?
        .into();

        let open_batches = load_open_batches_for_product(&mut *tx, product_id).await?;
        let mut engine = MovementEngine::from_parts(
            StockLedger::new(),
            ConversionTracker::with_batches(open_batches),
            [current],
        );
        engine.update_box_contents(product_id, input.box_contents)?;

        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products SET box_contents = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, sku, name, category, box_contents
            "#,
        )
        .bind(product_id.0)
        .bind(input.box_contents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%product_id, box_contents = input.box_contents, "Box contents changed");
        Ok(row.into())
    }
}
