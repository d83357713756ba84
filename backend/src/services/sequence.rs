//! Per-brand document numbering

use shared::{format_document_number, Brand, DocumentKind};
use sqlx::PgConnection;

use crate::error::AppResult;

/// Allocate the next number for `(brand, kind)`.
///
/// The upsert holds the counter row lock until the surrounding transaction
/// ends, so concurrent callers receive distinct values. A rolled-back
/// transaction releases its value.
pub async fn next_document_number(
    conn: &mut PgConnection,
    brand: Brand,
    kind: DocumentKind,
) -> AppResult<String> {
    let sequence = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO document_sequences (brand, kind, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (brand, kind)
        DO UPDATE SET last_value = document_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(brand.code())
    .bind(kind.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_document_number(brand, kind, sequence))
}
