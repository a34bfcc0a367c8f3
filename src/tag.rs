//! Tag hierarchy, synonyms, and the cached flat-descendants export.
//!
//! Tags form a single-parent tree (`tag_group_rel`) with an explicit
//! ancestor-walk cycle check on insert rather than a recursive SQL query.
//! Synonyms resolve to a master tag at lookup time and never chain, because
//! [`add_synonym`] and [`convert_to_synonym`] always resolve to the ultimate
//! master before writing. [`flat_descendants`] is the one derived index
//! everything else in the catalog leans on: for every tag and its synonyms,
//! the reflexive closure of its descendants, memoized until the next tag or
//! group write.

use crate::config::TagConfig;
use crate::error::{CatalogError, Result};
use crate::id::IdAllocator;
use crate::model::{now, Tag};
use crate::normalize::normalize_tag_name;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fetches a tag by exactly one of `name` or `id`. Resolves synonyms:
/// if `name` isn't a tag name, it is looked up as a synonym and the search
/// restarts against the synonym's master name.
pub async fn get_tag(pool: &SqlitePool, name: Option<&str>, id: Option<i64>) -> Result<Tag> {
    match (name, id) {
        (Some(_), Some(_)) => return Err(CatalogError::NotExclusive(vec!["name", "id"])),
        (None, None) => return Err(CatalogError::NotExclusive(vec!["name", "id"])),
        _ => {}
    }

    if let Some(id) = id {
        return sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CatalogError::NoSuchTag(id.to_string()));
    }

    let mut current = name.unwrap().to_lowercase();
    loop {
        if let Some(tag) = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE name = ?")
            .bind(&current)
            .fetch_optional(pool)
            .await?
        {
            return Ok(tag);
        }

        let master: Option<String> =
            sqlx::query_scalar("SELECT mastername FROM tag_synonyms WHERE name = ?")
                .bind(&current)
                .fetch_optional(pool)
                .await?;

        match master {
            Some(master) if master != current => current = master,
            _ => return Err(CatalogError::NoSuchTag(current)),
        }
    }
}

pub async fn new_tag(
    pool: &SqlitePool,
    config: &TagConfig,
    name: &str,
    description: Option<&str>,
    author_id: Option<i64>,
) -> Result<Tag> {
    let normalized = normalize_tag_name(name, config)?;

    if get_tag(pool, Some(&normalized), None).await.is_ok() {
        return Err(CatalogError::TagExists(normalized));
    }

    let id = IdAllocator::next(pool, "tags").await?;
    let created = now();
    sqlx::query("INSERT INTO tags (id, name, description, created, author_id) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(&normalized)
        .bind(description)
        .bind(created)
        .bind(author_id)
        .execute(pool)
        .await?;

    Ok(Tag { id, name: normalized, description: description.map(str::to_string), created, author_id })
}

/// Walks `id`'s ancestors, nearest first.
pub async fn walk_parents(pool: &SqlitePool, id: i64) -> Result<Vec<i64>> {
    let mut result = Vec::new();
    let mut current = id;
    loop {
        let parent: Option<i64> = sqlx::query_scalar("SELECT parentid FROM tag_group_rel WHERE memberid = ?")
            .bind(current)
            .fetch_optional(pool)
            .await?;
        match parent {
            Some(p) => {
                result.push(p);
                current = p;
            }
            None => break,
        }
    }
    Ok(result)
}

/// Walks `id`'s descendants (including itself), depth-first.
pub async fn walk_children(pool: &SqlitePool, id: i64) -> Result<Vec<i64>> {
    let mut result = vec![id];
    let mut frontier = vec![id];
    while let Some(current) = frontier.pop() {
        let children: Vec<i64> =
            sqlx::query_scalar("SELECT memberid FROM tag_group_rel WHERE parentid = ?")
                .bind(current)
                .fetch_all(pool)
                .await?;
        for child in children {
            result.push(child);
            frontier.push(child);
        }
    }
    Ok(result)
}

pub async fn add_child(pool: &SqlitePool, parent_id: i64, member_id: i64) -> Result<()> {
    let existing_parent: Option<i64> =
        sqlx::query_scalar("SELECT parentid FROM tag_group_rel WHERE memberid = ?")
            .bind(member_id)
            .fetch_optional(pool)
            .await?;

    match existing_parent {
        Some(p) if p == parent_id => return Ok(()),
        Some(_) => return Err(CatalogError::GroupExists(member_id.to_string())),
        None => {}
    }

    let ancestors = walk_parents(pool, parent_id).await?;
    if ancestors.contains(&member_id) || parent_id == member_id {
        return Err(CatalogError::RecursiveGrouping {
            parent: parent_id.to_string(),
            member: member_id.to_string(),
        });
    }

    sqlx::query("INSERT INTO tag_group_rel (parentid, memberid) VALUES (?, ?)")
        .bind(parent_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Removes the `(parent, member)` group relation, making `member` a root.
/// Fails [`CatalogError::NoSuchGroup`] if no such relation exists.
pub async fn remove_child(pool: &SqlitePool, parent_id: i64, member_id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM tag_group_rel WHERE parentid = ? AND memberid = ?")
        .bind(parent_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CatalogError::NoSuchGroup(member_id.to_string()));
    }
    Ok(())
}

pub async fn add_synonym(pool: &SqlitePool, config: &TagConfig, tag: &Tag, synname: &str) -> Result<()> {
    let normalized = normalize_tag_name(synname, config)?;
    if normalized == tag.name {
        return Err(CatalogError::CantSynonymSelf(normalized));
    }
    if get_tag(pool, Some(&normalized), None).await.is_ok() {
        return Err(CatalogError::TagExists(normalized));
    }

    sqlx::query("INSERT INTO tag_synonyms (name, mastername) VALUES (?, ?)")
        .bind(&normalized)
        .bind(&tag.name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_synonym(pool: &SqlitePool, master_name: &str, synname: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM tag_synonyms WHERE name = ? AND mastername = ?")
        .bind(synname)
        .bind(master_name)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CatalogError::NoSuchSynonym(synname.to_string()));
    }
    Ok(())
}

/// Demotes tag `old` into a synonym of `new`: its own synonyms are
/// reassigned to `new`, every photo tagged `old` but not `new` is tagged
/// `new` instead, and `old.name` itself becomes a synonym of `new`.
pub async fn convert_to_synonym(pool: &SqlitePool, old: &Tag, new: &Tag) -> Result<()> {
    sqlx::query("UPDATE tag_synonyms SET mastername = ? WHERE mastername = ?")
        .bind(&new.name)
        .bind(&old.name)
        .execute(pool)
        .await?;

    let photo_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT photoid FROM photo_tag_rel WHERE tagid = ? AND photoid NOT IN \
         (SELECT photoid FROM photo_tag_rel WHERE tagid = ?)",
    )
    .bind(old.id)
    .bind(new.id)
    .fetch_all(pool)
    .await?;

    for photo_id in photo_ids {
        sqlx::query("INSERT OR IGNORE INTO photo_tag_rel (photoid, tagid) VALUES (?, ?)")
            .bind(photo_id)
            .bind(new.id)
            .execute(pool)
            .await?;
    }

    delete(pool, old, false).await?;

    sqlx::query("INSERT INTO tag_synonyms (name, mastername) VALUES (?, ?)")
        .bind(&old.name)
        .bind(&new.name)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn rename(
    pool: &SqlitePool,
    config: &TagConfig,
    tag: &Tag,
    new_name: &str,
    apply_to_synonyms: bool,
) -> Result<()> {
    let normalized = normalize_tag_name(new_name, config)?;
    if normalized == tag.name {
        return Ok(());
    }
    if get_tag(pool, Some(&normalized), None).await.is_ok() {
        return Err(CatalogError::TagExists(normalized));
    }

    sqlx::query("UPDATE tags SET name = ? WHERE id = ?")
        .bind(&normalized)
        .bind(tag.id)
        .execute(pool)
        .await?;

    if apply_to_synonyms {
        sqlx::query("UPDATE tag_synonyms SET mastername = ? WHERE mastername = ?")
            .bind(&normalized)
            .bind(&tag.name)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Deletes `tag`. Without `delete_children`, children are reparented to
/// `tag`'s own parent (or made roots). With it, the whole subtree is
/// removed.
pub async fn delete(pool: &SqlitePool, tag: &Tag, delete_children: bool) -> Result<()> {
    let children: Vec<i64> = sqlx::query_scalar("SELECT memberid FROM tag_group_rel WHERE parentid = ?")
        .bind(tag.id)
        .fetch_all(pool)
        .await?;

    if delete_children {
        for child_id in children {
            let child = get_tag(pool, None, Some(child_id)).await?;
            Box::pin(delete(pool, &child, true)).await?;
        }
    } else {
        let grandparent: Option<i64> =
            sqlx::query_scalar("SELECT parentid FROM tag_group_rel WHERE memberid = ?")
                .bind(tag.id)
                .fetch_optional(pool)
                .await?;
        for child_id in children {
            sqlx::query("DELETE FROM tag_group_rel WHERE memberid = ?")
                .bind(child_id)
                .execute(pool)
                .await?;
            if let Some(gp) = grandparent {
                sqlx::query("INSERT INTO tag_group_rel (parentid, memberid) VALUES (?, ?)")
                    .bind(gp)
                    .bind(child_id)
                    .execute(pool)
                    .await?;
            }
        }
    }

    sqlx::query("DELETE FROM tag_group_rel WHERE memberid = ?").bind(tag.id).execute(pool).await?;
    sqlx::query("DELETE FROM photo_tag_rel WHERE tagid = ?").bind(tag.id).execute(pool).await?;
    sqlx::query("DELETE FROM tag_synonyms WHERE mastername = ?").bind(&tag.name).execute(pool).await?;
    sqlx::query("DELETE FROM tags WHERE id = ?").bind(tag.id).execute(pool).await?;

    Ok(())
}

/// For every tag, and every synonym of every tag, the set of names (itself
/// and all synonyms of all transitive descendants) that count as a match
/// for it. Synonyms of the same tag share the same `Arc` allocation.
pub async fn flat_descendants(pool: &SqlitePool) -> Result<HashMap<String, Arc<HashSet<String>>>> {
    let tags: Vec<Tag> = sqlx::query_as("SELECT * FROM tags").fetch_all(pool).await?;
    let synonyms: Vec<(String, String)> =
        sqlx::query_as("SELECT name, mastername FROM tag_synonyms").fetch_all(pool).await?;

    let mut synonyms_by_master: HashMap<String, Vec<String>> = HashMap::new();
    for (name, master) in &synonyms {
        synonyms_by_master.entry(master.clone()).or_default().push(name.clone());
    }

    let mut children_by_id: HashMap<i64, Vec<i64>> = HashMap::new();
    let rels: Vec<(i64, i64)> =
        sqlx::query_as("SELECT parentid, memberid FROM tag_group_rel").fetch_all(pool).await?;
    for (parent, member) in rels {
        children_by_id.entry(parent).or_default().push(member);
    }

    let tags_by_id: HashMap<i64, &Tag> = tags.iter().map(|t| (t.id, t)).collect();
    let mut memo: HashMap<i64, HashSet<String>> = HashMap::new();

    fn names_for(
        id: i64,
        tags_by_id: &HashMap<i64, &Tag>,
        children_by_id: &HashMap<i64, Vec<i64>>,
        synonyms_by_master: &HashMap<String, Vec<String>>,
        memo: &mut HashMap<i64, HashSet<String>>,
    ) -> HashSet<String> {
        if let Some(cached) = memo.get(&id) {
            return cached.clone();
        }
        let tag = tags_by_id[&id];
        let mut names = HashSet::new();
        names.insert(tag.name.clone());
        if let Some(syns) = synonyms_by_master.get(&tag.name) {
            names.extend(syns.iter().cloned());
        }
        if let Some(children) = children_by_id.get(&id) {
            for child in children {
                let child_names = names_for(*child, tags_by_id, children_by_id, synonyms_by_master, memo);
                names.extend(child_names);
            }
        }
        memo.insert(id, names.clone());
        names
    }

    let mut result = HashMap::new();
    for tag in &tags {
        let names = names_for(tag.id, &tags_by_id, &children_by_id, &synonyms_by_master, &mut memo);
        let shared = Arc::new(names);
        result.insert(tag.name.clone(), shared.clone());
        if let Some(syns) = synonyms_by_master.get(&tag.name) {
            for syn in syns {
                result.insert(syn.clone(), shared.clone());
            }
        }
    }

    Ok(result)
}

/// `a.b.c` style mini-language for batch tag/group/synonym creation:
/// dotted segments create/fetch tags and chain them as parent→child,
/// `name+synonym` adds a synonym, `old=new` renames.
pub async fn easybake(pool: &SqlitePool, config: &TagConfig, expression: &str) -> Result<Vec<(String, String)>> {
    let mut notes = Vec::new();

    for term in expression.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some((old, new)) = term.split_once('=') {
            let old_tag = get_tag(pool, Some(old.trim()), None).await?;
            rename(pool, config, &old_tag, new.trim(), false).await?;
            notes.push(("rename_tag".to_string(), new.trim().to_string()));
            continue;
        }

        if let Some((name, syn)) = term.split_once('+') {
            let tag = match get_tag(pool, Some(name.trim()), None).await {
                Ok(t) => t,
                Err(_) => new_tag(pool, config, name.trim(), None, None).await?,
            };
            add_synonym(pool, config, &tag, syn.trim()).await?;
            notes.push(("add_synonym".to_string(), format!("{}.{}", tag.name, syn.trim())));
            continue;
        }

        let mut parent: Option<Tag> = None;
        let mut qualified = String::new();
        for segment in term.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            if !qualified.is_empty() {
                qualified.push('.');
            }
            qualified.push_str(segment);

            let tag = match get_tag(pool, Some(segment), None).await {
                Ok(t) => {
                    notes.push(("existing_tag".to_string(), qualified.clone()));
                    t
                }
                Err(_) => {
                    let t = new_tag(pool, config, segment, None, None).await?;
                    notes.push(("new_tag".to_string(), qualified.clone()));
                    t
                }
            };

            if let Some(p) = &parent {
                if add_child(pool, p.id, tag.id).await.is_ok() {
                    notes.push(("join_group".to_string(), qualified.clone()));
                }
            }
            parent = Some(tag);
        }
    }

    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn setup() -> SqlitePool {
        Store::open_in_memory().await.unwrap().pool
    }

    #[tokio::test]
    async fn new_tag_then_get_tag_round_trips() {
        let pool = setup().await;
        let config = TagConfig::default();
        new_tag(&pool, &config, "foo", None, None).await.unwrap();
        let fetched = get_tag(&pool, Some("foo"), None).await.unwrap();
        assert_eq!(fetched.name, "foo");
    }

    #[tokio::test]
    async fn get_tag_rejects_both_name_and_id() {
        let pool = setup().await;
        let err = get_tag(&pool, Some("foo"), Some(1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotExclusive(_)));
    }

    #[tokio::test]
    async fn add_child_detects_cycles() {
        let pool = setup().await;
        let config = TagConfig::default();
        let a = new_tag(&pool, &config, "a", None, None).await.unwrap();
        let b = new_tag(&pool, &config, "b", None, None).await.unwrap();
        add_child(&pool, a.id, b.id).await.unwrap();
        let err = add_child(&pool, b.id, a.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::RecursiveGrouping { .. }));
    }

    #[tokio::test]
    async fn add_child_is_idempotent_for_same_parent() {
        let pool = setup().await;
        let config = TagConfig::default();
        let a = new_tag(&pool, &config, "a", None, None).await.unwrap();
        let b = new_tag(&pool, &config, "b", None, None).await.unwrap();
        add_child(&pool, a.id, b.id).await.unwrap();
        add_child(&pool, a.id, b.id).await.unwrap();
    }

    #[tokio::test]
    async fn add_child_rejects_second_parent() {
        let pool = setup().await;
        let config = TagConfig::default();
        let a = new_tag(&pool, &config, "a", None, None).await.unwrap();
        let b = new_tag(&pool, &config, "b", None, None).await.unwrap();
        let c = new_tag(&pool, &config, "c", None, None).await.unwrap();
        add_child(&pool, a.id, c.id).await.unwrap();
        let err = add_child(&pool, b.id, c.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::GroupExists(_)));
    }

    #[tokio::test]
    async fn synonym_resolves_to_master_without_chaining() {
        let pool = setup().await;
        let config = TagConfig::default();
        let music = new_tag(&pool, &config, "music", None, None).await.unwrap();
        add_synonym(&pool, &config, &music, "song").await.unwrap();
        let resolved = get_tag(&pool, Some("song"), None).await.unwrap();
        assert_eq!(resolved.name, "music");
    }

    #[tokio::test]
    async fn remove_synonym_undoes_add_synonym() {
        let pool = setup().await;
        let config = TagConfig::default();
        let music = new_tag(&pool, &config, "music", None, None).await.unwrap();
        add_synonym(&pool, &config, &music, "song").await.unwrap();
        remove_synonym(&pool, "music", "song").await.unwrap();
        assert!(get_tag(&pool, Some("song"), None).await.is_err());
    }

    #[tokio::test]
    async fn flat_descendants_covers_transitive_children_and_synonyms() {
        let pool = setup().await;
        let config = TagConfig::default();
        let food = new_tag(&pool, &config, "food", None, None).await.unwrap();
        let fruit = new_tag(&pool, &config, "fruit", None, None).await.unwrap();
        let apple = new_tag(&pool, &config, "apple", None, None).await.unwrap();
        add_child(&pool, food.id, fruit.id).await.unwrap();
        add_child(&pool, fruit.id, apple.id).await.unwrap();
        add_synonym(&pool, &config, &apple, "pomme").await.unwrap();

        let flat = flat_descendants(&pool).await.unwrap();
        let food_set = flat.get("food").unwrap();
        assert!(food_set.contains("apple"));
        assert!(food_set.contains("pomme"));
        assert!(flat.get("pomme").unwrap().contains("apple"));
    }

    #[tokio::test]
    async fn delete_without_children_reparents() {
        let pool = setup().await;
        let config = TagConfig::default();
        let food = new_tag(&pool, &config, "food", None, None).await.unwrap();
        let fruit = new_tag(&pool, &config, "fruit", None, None).await.unwrap();
        let apple = new_tag(&pool, &config, "apple", None, None).await.unwrap();
        add_child(&pool, food.id, fruit.id).await.unwrap();
        add_child(&pool, fruit.id, apple.id).await.unwrap();

        delete(&pool, &fruit, false).await.unwrap();

        let new_parent: Option<i64> =
            sqlx::query_scalar("SELECT parentid FROM tag_group_rel WHERE memberid = ?")
                .bind(apple.id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert_eq!(new_parent, Some(food.id));
    }

    #[tokio::test]
    async fn easybake_creates_chain_and_synonym() {
        let pool = setup().await;
        let config = TagConfig::default();
        easybake(&pool, &config, "media.music+song").await.unwrap();
        let resolved = get_tag(&pool, Some("song"), None).await.unwrap();
        assert_eq!(resolved.name, "music");
        let music_parent: Option<i64> =
            sqlx::query_scalar("SELECT parentid FROM tag_group_rel WHERE memberid = ?")
                .bind(resolved.id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(music_parent.is_some());
    }
}
