//! Photo search: tag containment, filename/tag boolean expressions, numeric
//! ranges, ordering, and optional album yielding, with a [`WarningBag`]
//! collecting anything the caller asked for that had to be normalized away.
//!
//! Tag containment (`tag_musts`/`tag_mays`/`tag_forbids`) is expanded through
//! [`crate::tag::flat_descendants`] before querying, so asking for `animal`
//! also matches photos tagged only with `cat`. Everything else — mimetype
//! class, the boolean expressions, `within_directory` — is applied as a
//! post-filter in Rust after the SQL query narrows by tag and range, since
//! those conditions don't map cleanly onto an indexable SQL predicate.
//! `limit`/`offset` apply last, after every post-filter has run, so a page
//! boundary never lands in the middle of rows the post-filters would have
//! dropped anyway.

use crate::album;
use crate::error::CatalogError;
use crate::expression::ExpressionTree;
use crate::model::{Album, Photo, WarningBag};
use crate::normalize::{
    normalize_limit, normalize_offset, normalize_orderby, parse_hyphen_range,
};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub tag_musts: Vec<String>,
    pub tag_mays: Vec<String>,
    pub tag_forbids: Vec<String>,
    pub tag_expression: Option<String>,
    pub filename_expression: Option<String>,
    pub extension: Vec<String>,
    pub extension_not: Vec<String>,
    pub mimetype: Vec<String>,
    pub within_directory: Option<String>,
    pub author: Vec<i64>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub bytes: Option<String>,
    pub duration: Option<String>,
    pub area: Option<String>,
    pub aspectratio: Option<String>,
    pub created: Option<String>,
    pub has_tags: Option<bool>,
    pub has_thumbnail: Option<bool>,
    pub is_searchhidden: Option<bool>,
    pub orderby: Vec<(String, String)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub yield_photos: bool,
    pub yield_albums: bool,
    pub give_back_parameters: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            tag_musts: Vec::new(),
            tag_mays: Vec::new(),
            tag_forbids: Vec::new(),
            tag_expression: None,
            filename_expression: None,
            extension: Vec::new(),
            extension_not: Vec::new(),
            mimetype: Vec::new(),
            within_directory: None,
            author: Vec::new(),
            width: None,
            height: None,
            bytes: None,
            duration: None,
            area: None,
            aspectratio: None,
            created: None,
            has_tags: None,
            has_thumbnail: None,
            is_searchhidden: Some(false),
            orderby: Vec::new(),
            limit: None,
            offset: None,
            yield_photos: true,
            yield_albums: false,
            give_back_parameters: false,
        }
    }
}

#[derive(Debug)]
pub struct SearchResult {
    pub photos: Vec<Photo>,
    pub albums: Vec<Album>,
    pub parameters: Option<SearchParams>,
    pub warnings: WarningBag,
}

fn names_matching(flat: &HashMap<String, Arc<HashSet<String>>>, wanted: &[String]) -> HashSet<String> {
    let mut result = HashSet::new();
    for name in wanted {
        if let Some(set) = flat.get(name) {
            result.extend(set.iter().cloned());
        } else {
            result.insert(name.clone());
        }
    }
    result
}

pub async fn search(
    pool: &SqlitePool,
    flat: &HashMap<String, Arc<HashSet<String>>>,
    params: &SearchParams,
) -> crate::error::Result<SearchResult> {
    if !params.yield_photos && !params.yield_albums {
        return Err(CatalogError::NoYields);
    }

    let mut warnings = WarningBag::new();

    let mut sql = String::from("SELECT DISTINCT photos.* FROM photos");
    let mut conditions: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    match params.is_searchhidden {
        Some(true) => conditions.push("photos.searchhidden = 1".to_string()),
        Some(false) => conditions.push("photos.searchhidden = 0".to_string()),
        None => {}
    }

    let has_tag_filters = !params.tag_musts.is_empty()
        || !params.tag_mays.is_empty()
        || !params.tag_forbids.is_empty();

    let use_musts_mays_forbids = if params.tag_expression.is_some() && has_tag_filters {
        warnings.add("tag_expression is mutually exclusive with tag_musts/tag_mays/tag_forbids; ignoring them".to_string());
        false
    } else {
        true
    };

    match params.has_tags {
        Some(false) => {
            conditions.push(
                "NOT EXISTS (SELECT 1 FROM photo_tag_rel WHERE photo_tag_rel.photoid = photos.id)"
                    .to_string(),
            );
            if has_tag_filters || params.tag_expression.is_some() {
                warnings.add("has_tags=false excludes tag_musts/tag_mays/tag_forbids/tag_expression; ignoring them".to_string());
            }
        }
        Some(true) => {
            conditions.push(
                "EXISTS (SELECT 1 FROM photo_tag_rel WHERE photo_tag_rel.photoid = photos.id)"
                    .to_string(),
            );
            push_tag_conditions(params, flat, use_musts_mays_forbids, &mut conditions, &mut binds);
        }
        None => {
            push_tag_conditions(params, flat, use_musts_mays_forbids, &mut conditions, &mut binds);
        }
    }

    if !params.extension.is_empty() {
        if params.extension.iter().any(|e| e == "*") {
            conditions.push("photos.extension != ''".to_string());
        } else {
            let placeholders = params.extension.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            conditions.push(format!("photos.extension IN ({placeholders})"));
            binds.extend(params.extension.iter().cloned());
        }
    }

    if !params.extension_not.is_empty() {
        if params.extension_not.iter().any(|e| e == "*") {
            conditions.push("photos.extension = ''".to_string());
        } else {
            let placeholders = params.extension_not.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            conditions.push(format!("photos.extension NOT IN ({placeholders})"));
            binds.extend(params.extension_not.iter().cloned());
        }
    }

    if !params.author.is_empty() {
        let placeholders = params.author.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        conditions.push(format!("photos.author_id IN ({placeholders})"));
        binds.extend(params.author.iter().map(i64::to_string));
    }

    match params.has_thumbnail {
        Some(true) => conditions.push("photos.thumbnail_relpath IS NOT NULL".to_string()),
        Some(false) => conditions.push("photos.thumbnail_relpath IS NULL".to_string()),
        None => {}
    }

    if let Some(directory) = &params.within_directory {
        conditions.push("photos.filepath LIKE ?".to_string());
        binds.push(format!("{directory}%"));
    }

    apply_range(&params.width, "photos.width", &mut conditions, &mut warnings);
    apply_range(&params.height, "photos.height", &mut conditions, &mut warnings);
    apply_range(&params.bytes, "photos.bytes", &mut conditions, &mut warnings);
    apply_range(&params.duration, "photos.duration", &mut conditions, &mut warnings);
    apply_range(&params.area, "photos.area", &mut conditions, &mut warnings);
    apply_range(&params.aspectratio, "photos.aspectratio", &mut conditions, &mut warnings);
    apply_range(&params.created, "photos.created", &mut conditions, &mut warnings);

    let mut orderby = normalize_orderby(&params.orderby, Some(&mut warnings));
    if orderby.is_empty() {
        orderby.push(("created".to_string(), "desc".to_string()));
    }
    for (column, _) in &orderby {
        if column != "RANDOM()" {
            conditions.push(format!("photos.{column} IS NOT NULL"));
        }
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    let clauses: Vec<String> = orderby
        .iter()
        .map(|(column, direction)| {
            if column == "RANDOM()" {
                "RANDOM()".to_string()
            } else {
                format!("photos.{column} {}", direction.to_uppercase())
            }
        })
        .collect();
    sql.push_str(" ORDER BY ");
    sql.push_str(&clauses.join(", "));

    let mut query = sqlx::query_as::<_, Photo>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let mut photos = query.fetch_all(pool).await?;

    if !params.mimetype.is_empty() {
        photos.retain(|p| {
            p.simple_mimetype().map(|m| params.mimetype.iter().any(|w| w == m)).unwrap_or(false)
        });
    }

    if let Some(raw) = &params.filename_expression {
        match ExpressionTree::parse(raw) {
            Ok(mut tree) => {
                tree.map_atoms(|s| s.to_lowercase());
                photos.retain(|p| {
                    let haystack = p.basename().to_lowercase();
                    tree.evaluate(&|atom| haystack.contains(atom))
                });
            }
            Err(_) => warnings.add(format!("filename expression '{raw}' had no usable tokens")),
        }
    }

    if let Some(raw) = &params.tag_expression {
        match ExpressionTree::parse(raw) {
            Ok(tree) => {
                let mut retained = Vec::with_capacity(photos.len());
                for photo in photos {
                    let tag_names: HashSet<String> = sqlx::query_scalar(
                        "SELECT tags.name FROM tags JOIN photo_tag_rel ON tags.id = photo_tag_rel.tagid \
                         WHERE photo_tag_rel.photoid = ?",
                    )
                    .bind(photo.id)
                    .fetch_all(pool)
                    .await?
                    .into_iter()
                    .collect();
                    if tree.evaluate(&|atom| match_tag_atom(atom, flat, &tag_names)) {
                        retained.push(photo);
                    }
                }
                photos = retained;
            }
            Err(_) => warnings.add(format!("tag expression '{raw}' had no usable tokens")),
        }
    }

    // limit/offset apply last, after every post-SQL filter above has run.
    let limit = normalize_limit(params.limit, Some(&mut warnings));
    let offset = normalize_offset(params.offset, Some(&mut warnings)) as usize;
    let matched: Vec<Photo> = photos.into_iter().skip(offset).collect();
    let matched: Vec<Photo> = match limit {
        Some(n) => matched.into_iter().take(n.max(0) as usize).collect(),
        None => matched,
    };

    let mut albums = Vec::new();
    if params.yield_albums {
        let mut seen = HashSet::new();
        for photo in &matched {
            let album_ids: Vec<i64> =
                sqlx::query_scalar("SELECT albumid FROM album_photo_rel WHERE photoid = ?")
                    .bind(photo.id)
                    .fetch_all(pool)
                    .await?;
            for album_id in album_ids {
                if seen.insert(album_id) {
                    albums.push(album::get_album(pool, album_id).await?);
                }
            }
        }
    }

    let parameters = if params.give_back_parameters { Some(params.clone()) } else { None };
    let photos = if params.yield_photos { matched } else { Vec::new() };

    Ok(SearchResult { photos, albums, parameters, warnings })
}

fn match_tag_atom(atom: &str, flat: &HashMap<String, Arc<HashSet<String>>>, tag_names: &HashSet<String>) -> bool {
    match flat.get(atom) {
        Some(covering) => covering.iter().any(|name| tag_names.contains(name)),
        None => tag_names.contains(atom),
    }
}

fn push_tag_conditions(
    params: &SearchParams,
    flat: &HashMap<String, Arc<HashSet<String>>>,
    use_musts_mays_forbids: bool,
    conditions: &mut Vec<String>,
    binds: &mut Vec<String>,
) {
    if !use_musts_mays_forbids {
        return;
    }

    let must_names = names_matching(flat, &params.tag_musts);
    let may_names = names_matching(flat, &params.tag_mays);
    let forbid_names = names_matching(flat, &params.tag_forbids);

    for name in &must_names {
        conditions.push(
            "EXISTS (SELECT 1 FROM photo_tag_rel JOIN tags ON tags.id = photo_tag_rel.tagid \
             WHERE photo_tag_rel.photoid = photos.id AND tags.name = ?)"
                .to_string(),
        );
        binds.push(name.clone());
    }

    if !may_names.is_empty() {
        let placeholders = may_names.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM photo_tag_rel JOIN tags ON tags.id = photo_tag_rel.tagid \
             WHERE photo_tag_rel.photoid = photos.id AND tags.name IN ({placeholders}))"
        ));
        binds.extend(may_names.iter().cloned());
    }

    for name in &forbid_names {
        conditions.push(
            "NOT EXISTS (SELECT 1 FROM photo_tag_rel JOIN tags ON tags.id = photo_tag_rel.tagid \
             WHERE photo_tag_rel.photoid = photos.id AND tags.name = ?)"
                .to_string(),
        );
        binds.push(name.clone());
    }
}

fn apply_range(raw: &Option<String>, column: &str, conditions: &mut Vec<String>, warnings: &mut WarningBag) {
    let Some(raw) = raw else { return };
    let range = match parse_hyphen_range(raw) {
        Ok(range) => range,
        Err(e) => {
            warnings.add(format!("ignoring unparseable range for {column}: {e}"));
            return;
        }
    };
    if let Some(low) = range.low {
        conditions.push(format!("{column} >= {low}"));
    }
    if let Some(high) = range.high {
        conditions.push(format!("{column} <= {high}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagConfig;
    use crate::store::Store;
    use crate::tag;

    async fn seeded() -> SqlitePool {
        let pool = Store::open_in_memory().await.unwrap().pool;
        let config = TagConfig::default();
        let animal = tag::new_tag(&pool, &config, "animal", None, None).await.unwrap();
        let cat = tag::new_tag(&pool, &config, "cat", None, None).await.unwrap();
        tag::add_child(&pool, animal.id, cat.id).await.unwrap();

        sqlx::query(
            "INSERT INTO photos (id, filepath, extension, created, searchhidden) \
             VALUES (1, '/pics/cat1.jpg', 'jpg', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO photos (id, filepath, extension, created, searchhidden) \
             VALUES (2, '/pics/dog1.jpg', 'jpg', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO photo_tag_rel (photoid, tagid) VALUES (1, ?)")
            .bind(cat.id)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn must_tag_expands_through_descendants() {
        let pool = seeded().await;
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams { tag_musts: vec!["animal".to_string()], ..Default::default() };
        let result = search(&pool, &flat, &params).await.unwrap();
        assert_eq!(result.photos.len(), 1);
        assert_eq!(result.photos[0].id, 1);
    }

    #[tokio::test]
    async fn filename_expression_filters_case_insensitively() {
        let pool = seeded().await;
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams {
            filename_expression: Some("DOG".to_string()),
            ..Default::default()
        };
        let result = search(&pool, &flat, &params).await.unwrap();
        assert_eq!(result.photos.len(), 1);
        assert_eq!(result.photos[0].id, 2);
    }

    #[tokio::test]
    async fn unknown_orderby_column_is_dropped_with_warning() {
        let pool = seeded().await;
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams {
            orderby: vec![("bogus".to_string(), "asc".to_string())],
            ..Default::default()
        };
        let result = search(&pool, &flat, &params).await.unwrap();
        assert!(!result.warnings.is_empty());
        assert_eq!(result.photos.len(), 2);
    }

    #[tokio::test]
    async fn empty_orderby_defaults_to_created_descending() {
        let pool = seeded().await;
        sqlx::query("UPDATE photos SET created = 500 WHERE id = 1").execute(&pool).await.unwrap();
        sqlx::query("UPDATE photos SET created = 100 WHERE id = 2").execute(&pool).await.unwrap();
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let result = search(&pool, &flat, &SearchParams::default()).await.unwrap();
        assert_eq!(result.photos[0].id, 1);
        assert_eq!(result.photos[1].id, 2);
    }

    #[tokio::test]
    async fn ratio_orderby_aliases_to_aspectratio_column() {
        let pool = seeded().await;
        sqlx::query("UPDATE photos SET aspectratio = 1.5 WHERE id = 1").execute(&pool).await.unwrap();
        sqlx::query("UPDATE photos SET aspectratio = 1.0 WHERE id = 2").execute(&pool).await.unwrap();
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams {
            orderby: vec![("ratio".to_string(), "asc".to_string())],
            ..Default::default()
        };
        let result = search(&pool, &flat, &params).await.unwrap();
        assert_eq!(result.photos[0].id, 2);
        assert_eq!(result.photos[1].id, 1);
    }

    #[tokio::test]
    async fn limit_and_offset_apply_after_post_filters() {
        let pool = seeded().await;
        sqlx::query(
            "INSERT INTO photos (id, filepath, extension, created, searchhidden) \
             VALUES (3, '/pics/dog2.jpg', 'jpg', 1, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams {
            filename_expression: Some("dog".to_string()),
            limit: Some(1),
            orderby: vec![("created".to_string(), "asc".to_string())],
            ..Default::default()
        };
        let result = search(&pool, &flat, &params).await.unwrap();
        assert_eq!(result.photos.len(), 1);
        assert_eq!(result.photos[0].id, 2);
    }

    #[tokio::test]
    async fn no_yields_when_both_targets_disabled() {
        let pool = seeded().await;
        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams { yield_photos: false, yield_albums: false, ..Default::default() };
        let err = search(&pool, &flat, &params).await.unwrap_err();
        assert!(matches!(err, CatalogError::NoYields));
    }

    #[tokio::test]
    async fn yield_albums_collects_containing_albums_for_matched_photos() {
        let pool = seeded().await;
        let album = crate::album::new_album(&pool, Some("vacation"), None, None).await.unwrap();
        crate::album::add_photo(&pool, album.id, 1).await.unwrap();

        let flat = tag::flat_descendants(&pool).await.unwrap();
        let params = SearchParams {
            tag_musts: vec!["cat".to_string()],
            yield_albums: true,
            ..Default::default()
        };
        let result = search(&pool, &flat, &params).await.unwrap();
        assert_eq!(result.albums.len(), 1);
        assert_eq!(result.albums[0].id, album.id);
    }
}
