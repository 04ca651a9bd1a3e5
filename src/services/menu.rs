use crate::{
    error::{AppError, AppResult},
    models::{board, menu, menu_content, Board, Menu, MenuContent, MenuModel, MenuType},
    services::cache::{CacheService, DEFAULT_TTL_SECS, KEY_NAVIGATION},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NavBoard {
    pub id: i32,
    pub code: String,
    pub name: String,
}

/// A navigation entry. Only the field that belongs to `menu_type` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NavNode {
    pub id: i32,
    pub name: String,
    pub menu_type: MenuType,
    pub depth: i32,
    pub display_order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<NavBoard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_content: Option<bool>,
    #[schema(no_recursion)]
    pub children: Vec<NavNode>,
}

#[derive(Debug, Clone)]
pub struct MenuDetail {
    pub menu: MenuModel,
    pub board: Option<NavBoard>,
    pub content: Option<String>,
    /// Root first, the node itself last.
    pub path: Vec<MenuModel>,
}

#[derive(Debug, Clone)]
pub struct NewMenu {
    pub parent_id: Option<i32>,
    pub name: String,
    pub menu_type: MenuType,
    pub board_id: Option<i32>,
    pub external_url: Option<String>,
    pub content: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
}

/// `parent_id: Some(None)` moves the node to the root level.
#[derive(Debug, Clone, Default)]
pub struct MenuChanges {
    pub name: Option<String>,
    pub menu_type: Option<MenuType>,
    pub board_id: Option<i32>,
    pub external_url: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    pub parent_id: Option<Option<i32>>,
}

/// Children index rebuilt from parent pointers.
fn children_index(menus: &[MenuModel]) -> HashMap<Option<i32>, Vec<&MenuModel>> {
    let mut index: HashMap<Option<i32>, Vec<&MenuModel>> = HashMap::new();
    for m in menus {
        index.entry(m.parent_id).or_default().push(m);
    }
    for siblings in index.values_mut() {
        siblings.sort_by_key(|m| (m.display_order, m.id));
    }
    index
}

/// New depth for every descendant of `root_id`, which itself sits at `root_depth`.
fn descendant_depths(menus: &[MenuModel], root_id: i32, root_depth: i32) -> Vec<(i32, i32)> {
    let index = children_index(menus);
    let mut seen = HashSet::from([root_id]);
    let mut queue = VecDeque::from([(root_id, root_depth)]);
    let mut out = Vec::new();

    while let Some((id, depth)) = queue.pop_front() {
        for child in index.get(&Some(id)).into_iter().flatten() {
            if seen.insert(child.id) {
                out.push((child.id, depth + 1));
                queue.push_back((child.id, depth + 1));
            }
        }
    }
    out
}

/// Walks parent links from `start` to the root and returns them root first.
fn ancestry<'a>(by_id: &HashMap<i32, &'a MenuModel>, start: i32) -> Vec<&'a MenuModel> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if !seen.insert(id) {
            break;
        }
        let Some(node) = by_id.get(&id) else { break };
        chain.push(*node);
        cursor = node.parent_id;
    }
    chain.reverse();
    chain
}

fn build_nav(
    parent: Option<i32>,
    index: &HashMap<Option<i32>, Vec<&MenuModel>>,
    boards: &HashMap<i32, NavBoard>,
    with_content: &HashSet<i32>,
    seen: &mut HashSet<i32>,
) -> Vec<NavNode> {
    let Some(siblings) = index.get(&parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(siblings.len());
    for m in siblings {
        if !seen.insert(m.id) {
            continue;
        }
        let (board, url, has_content) = match m.menu_type {
            MenuType::Board => (m.board_id.and_then(|id| boards.get(&id).cloned()), None, None),
            MenuType::External => (None, m.external_url.clone(), None),
            MenuType::Html => (None, None, Some(with_content.contains(&m.id))),
        };
        nodes.push(NavNode {
            id: m.id,
            name: m.name.clone(),
            menu_type: m.menu_type,
            depth: m.depth,
            display_order: m.display_order,
            board,
            url,
            has_content,
            children: build_nav(Some(m.id), index, boards, with_content, seen),
        });
    }
    nodes
}

pub struct MenuService {
    db: DatabaseConnection,
    cache: Option<CacheService>,
}

impl MenuService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, cache: None }
    }

    pub fn with_cache(mut self, cache: CacheService) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<MenuModel> {
        Menu::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn roots(&self) -> AppResult<Vec<MenuModel>> {
        let menus = Menu::find()
            .filter(menu::Column::ParentId.is_null())
            .filter(menu::Column::IsVisible.eq(true))
            .order_by_asc(menu::Column::DisplayOrder)
            .order_by_asc(menu::Column::Id)
            .all(&self.db)
            .await?;
        Ok(menus)
    }

    pub async fn children(&self, id: i32) -> AppResult<Vec<MenuModel>> {
        let menus = Menu::find()
            .filter(menu::Column::ParentId.eq(id))
            .filter(menu::Column::IsVisible.eq(true))
            .order_by_asc(menu::Column::DisplayOrder)
            .order_by_asc(menu::Column::Id)
            .all(&self.db)
            .await?;
        Ok(menus)
    }

    /// Breadcrumb from the root down to `id`.
    pub async fn path(&self, id: i32) -> AppResult<Vec<MenuModel>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                break;
            }
            let Some(node) = Menu::find_by_id(current).one(&self.db).await? else {
                break;
            };
            cursor = node.parent_id;
            chain.push(node);
        }
        if chain.is_empty() {
            return Err(AppError::NotFound);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Admin listing: every node, shallow levels first.
    pub async fn list_all(&self) -> AppResult<Vec<MenuModel>> {
        let menus = Menu::find()
            .order_by_asc(menu::Column::Depth)
            .order_by_asc(menu::Column::DisplayOrder)
            .order_by_asc(menu::Column::Id)
            .all(&self.db)
            .await?;
        Ok(menus)
    }

    pub async fn by_depth(&self, depth: i32) -> AppResult<Vec<MenuModel>> {
        let menus = Menu::find()
            .filter(menu::Column::Depth.eq(depth))
            .filter(menu::Column::IsVisible.eq(true))
            .order_by_asc(menu::Column::DisplayOrder)
            .all(&self.db)
            .await?;
        Ok(menus)
    }

    pub async fn by_type(&self, menu_type: MenuType) -> AppResult<Vec<MenuModel>> {
        let menus = Menu::find()
            .filter(menu::Column::MenuType.eq(menu_type))
            .filter(menu::Column::IsVisible.eq(true))
            .order_by_asc(menu::Column::Depth)
            .order_by_asc(menu::Column::DisplayOrder)
            .all(&self.db)
            .await?;
        Ok(menus)
    }

    /// First visible menu pointing at the board, if any.
    pub async fn by_board(&self, board_id: i32) -> AppResult<Option<MenuModel>> {
        let found = Menu::find()
            .filter(menu::Column::BoardId.eq(board_id))
            .filter(menu::Column::MenuType.eq(MenuType::Board))
            .filter(menu::Column::IsVisible.eq(true))
            .order_by_asc(menu::Column::Depth)
            .order_by_asc(menu::Column::DisplayOrder)
            .one(&self.db)
            .await?;
        Ok(found)
    }

    /// The whole visible tree. Children of hidden nodes are not reachable.
    pub async fn navigation(&self) -> AppResult<Vec<NavNode>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get::<Vec<NavNode>>(KEY_NAVIGATION).await {
                return Ok(cached);
            }
        }

        let menus = Menu::find()
            .filter(menu::Column::IsVisible.eq(true))
            .all(&self.db)
            .await?;

        let board_ids: Vec<i32> = menus.iter().filter_map(|m| m.board_id).collect();
        let boards: HashMap<i32, NavBoard> = if board_ids.is_empty() {
            HashMap::new()
        } else {
            Board::find()
                .filter(board::Column::Id.is_in(board_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|b| {
                    (
                        b.id,
                        NavBoard {
                            id: b.id,
                            code: b.code,
                            name: b.name,
                        },
                    )
                })
                .collect()
        };

        let html_ids: Vec<i32> = menus
            .iter()
            .filter(|m| m.menu_type == MenuType::Html)
            .map(|m| m.id)
            .collect();
        let with_content: HashSet<i32> = if html_ids.is_empty() {
            HashSet::new()
        } else {
            MenuContent::find()
                .filter(menu_content::Column::MenuId.is_in(html_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|c| c.menu_id)
                .collect()
        };

        let index = children_index(&menus);
        let tree = build_nav(None, &index, &boards, &with_content, &mut HashSet::new());

        if let Some(cache) = &self.cache {
            cache.set(KEY_NAVIGATION, &tree, DEFAULT_TTL_SECS).await;
        }
        Ok(tree)
    }

    /// Public node view. Hidden nodes do not exist for visitors.
    pub async fn detail(&self, id: i32) -> AppResult<MenuDetail> {
        let menu = self.get_by_id(id).await?;
        if !menu.is_visible {
            return Err(AppError::NotFound);
        }

        let board = match (menu.menu_type, menu.board_id) {
            (MenuType::Board, Some(board_id)) => Board::find_by_id(board_id)
                .one(&self.db)
                .await?
                .map(|b| NavBoard {
                    id: b.id,
                    code: b.code,
                    name: b.name,
                }),
            _ => None,
        };

        let content = if menu.menu_type == MenuType::Html {
            MenuContent::find()
                .filter(menu_content::Column::MenuId.eq(id))
                .one(&self.db)
                .await?
                .map(|c| c.content)
        } else {
            None
        };

        let path = self.path(id).await?;
        Ok(MenuDetail {
            menu,
            board,
            content,
            path,
        })
    }

    pub async fn create(&self, input: NewMenu) -> AppResult<MenuModel> {
        let txn = self.db.begin().await?;

        let depth = match input.parent_id {
            Some(parent_id) => {
                let parent = Menu::find_by_id(parent_id)
                    .one(&txn)
                    .await?
                    .ok_or(AppError::NotFound)?;
                parent.depth + 1
            }
            None => 1,
        };

        let (board_id, external_url) = match input.menu_type {
            MenuType::Board => {
                let board_id = input.board_id.ok_or_else(|| {
                    AppError::Validation("board_id is required for board menus".to_string())
                })?;
                ensure_board_exists(&txn, board_id).await?;
                (Some(board_id), None)
            }
            MenuType::External => {
                let url = input
                    .external_url
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::Validation(
                            "external_url is required for external menus".to_string(),
                        )
                    })?;
                (None, Some(url))
            }
            MenuType::Html => (None, None),
        };

        let now = chrono::Utc::now().naive_utc();
        let new_menu = menu::ActiveModel {
            parent_id: sea_orm::ActiveValue::Set(input.parent_id),
            name: sea_orm::ActiveValue::Set(input.name),
            menu_type: sea_orm::ActiveValue::Set(input.menu_type),
            board_id: sea_orm::ActiveValue::Set(board_id),
            external_url: sea_orm::ActiveValue::Set(external_url),
            display_order: sea_orm::ActiveValue::Set(input.display_order.unwrap_or(0)),
            depth: sea_orm::ActiveValue::Set(depth),
            is_visible: sea_orm::ActiveValue::Set(input.is_visible.unwrap_or(true)),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };
        let created = new_menu.insert(&txn).await?;

        if input.menu_type == MenuType::Html {
            if let Some(html) = input.content {
                upsert_content(&txn, created.id, html).await?;
            }
        }

        txn.commit().await?;
        tracing::info!("Menu created: {} at depth {}", created.id, created.depth);
        self.invalidate_navigation().await;
        Ok(created)
    }

    /// Field updates. Switching `menu_type` keeps whatever board/url/content the
    /// node had; serialization ignores fields that don't match the type.
    pub async fn update(&self, id: i32, changes: MenuChanges) -> AppResult<MenuModel> {
        let existing = self.get_by_id(id).await?;

        if let Some(board_id) = changes.board_id {
            ensure_board_exists(&self.db, board_id).await?;
        }
        let effective_type = changes.menu_type.unwrap_or(existing.menu_type);
        if effective_type == MenuType::Board
            && changes.board_id.or(existing.board_id).is_none()
        {
            return Err(AppError::Validation(
                "board_id is required for board menus".to_string(),
            ));
        }
        if effective_type == MenuType::External
            && changes
                .external_url
                .as_ref()
                .or(existing.external_url.as_ref())
                .is_none()
        {
            return Err(AppError::Validation(
                "external_url is required for external menus".to_string(),
            ));
        }

        if let Some(parent_id) = changes.parent_id {
            if parent_id != existing.parent_id {
                self.reparent(id, parent_id).await?;
            }
        }

        // Re-read so depth and parent reflect a reparent that just happened.
        let current = self.get_by_id(id).await?;
        let mut active: menu::ActiveModel = current.into();
        if let Some(name) = changes.name {
            active.name = sea_orm::ActiveValue::Set(name);
        }
        if let Some(menu_type) = changes.menu_type {
            active.menu_type = sea_orm::ActiveValue::Set(menu_type);
        }
        if let Some(board_id) = changes.board_id {
            active.board_id = sea_orm::ActiveValue::Set(Some(board_id));
        }
        if let Some(url) = changes.external_url {
            active.external_url = sea_orm::ActiveValue::Set(Some(url));
        }
        if let Some(order) = changes.display_order {
            active.display_order = sea_orm::ActiveValue::Set(order);
        }
        if let Some(visible) = changes.is_visible {
            active.is_visible = sea_orm::ActiveValue::Set(visible);
        }
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());

        let updated = active.update(&self.db).await?;
        self.invalidate_navigation().await;
        Ok(updated)
    }

    /// Moves a node under `new_parent` (or to the root) and rewrites the stored
    /// depth of the node and its whole subtree in one transaction.
    pub async fn reparent(&self, id: i32, new_parent: Option<i32>) -> AppResult<MenuModel> {
        let txn = self.db.begin().await?;

        let node = Menu::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        let all = Menu::find().all(&txn).await?;

        let depth = match new_parent {
            None => 1,
            Some(parent_id) => {
                if parent_id == id {
                    return Err(AppError::Validation(
                        "A menu cannot be its own parent".to_string(),
                    ));
                }
                let by_id: HashMap<i32, &MenuModel> = all.iter().map(|m| (m.id, m)).collect();
                let parent = by_id.get(&parent_id).ok_or(AppError::NotFound)?;
                if ancestry(&by_id, parent_id).iter().any(|m| m.id == id) {
                    return Err(AppError::Validation(
                        "A menu cannot be moved under its own descendant".to_string(),
                    ));
                }
                parent.depth + 1
            }
        };

        let mut active: menu::ActiveModel = node.into();
        active.parent_id = sea_orm::ActiveValue::Set(new_parent);
        active.depth = sea_orm::ActiveValue::Set(depth);
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());
        let moved = active.update(&txn).await?;

        let current_depth: HashMap<i32, i32> = all.iter().map(|m| (m.id, m.depth)).collect();
        let mut rewritten = 0usize;
        for (child_id, child_depth) in descendant_depths(&all, id, depth) {
            if current_depth.get(&child_id) == Some(&child_depth) {
                continue;
            }
            Menu::update_many()
                .col_expr(
                    menu::Column::Depth,
                    sea_orm::sea_query::Expr::value(child_depth),
                )
                .filter(menu::Column::Id.eq(child_id))
                .exec(&txn)
                .await?;
            rewritten += 1;
        }

        txn.commit().await?;
        tracing::info!(
            "Menu {} moved under {:?} at depth {} ({} descendants updated)",
            id,
            new_parent,
            depth,
            rewritten
        );
        self.invalidate_navigation().await;
        Ok(moved)
    }

    pub async fn set_display_order(&self, id: i32, order: i32) -> AppResult<MenuModel> {
        self.update(
            id,
            MenuChanges {
                display_order: Some(order),
                ..Default::default()
            },
        )
        .await
    }

    /// Creates or replaces the HTML body of an html node.
    pub async fn set_content(&self, id: i32, html: String) -> AppResult<()> {
        let node = self.get_by_id(id).await?;
        if node.menu_type != MenuType::Html {
            return Err(AppError::Validation(
                "Content can only be set on html menus".to_string(),
            ));
        }
        upsert_content(&self.db, id, html).await?;
        self.invalidate_navigation().await;
        Ok(())
    }

    /// Deletes the node and, through the parent foreign key, its subtree.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let existing = self.get_by_id(id).await?;
        Menu::delete_by_id(existing.id).exec(&self.db).await?;
        tracing::info!("Menu deleted: {} ({})", existing.id, existing.name);
        self.invalidate_navigation().await;
        Ok(())
    }

    pub async fn count(&self) -> AppResult<u64> {
        Ok(Menu::find().count(&self.db).await?)
    }

    async fn invalidate_navigation(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(KEY_NAVIGATION).await;
        }
    }
}

async fn ensure_board_exists<C: ConnectionTrait>(conn: &C, board_id: i32) -> AppResult<()> {
    Board::find_by_id(board_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound)
}

async fn upsert_content<C: ConnectionTrait>(conn: &C, menu_id: i32, html: String) -> AppResult<()> {
    let now = chrono::Utc::now().naive_utc();
    let existing = MenuContent::find()
        .filter(menu_content::Column::MenuId.eq(menu_id))
        .one(conn)
        .await?;

    match existing {
        Some(found) => {
            let mut active: menu_content::ActiveModel = found.into();
            active.content = sea_orm::ActiveValue::Set(html);
            active.updated_at = sea_orm::ActiveValue::Set(now);
            active.update(conn).await?;
        }
        None => {
            menu_content::ActiveModel {
                menu_id: sea_orm::ActiveValue::Set(menu_id),
                content: sea_orm::ActiveValue::Set(html),
                updated_at: sea_orm::ActiveValue::Set(now),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn node(id: i32, parent_id: Option<i32>, depth: i32, order: i32) -> MenuModel {
        let at = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        MenuModel {
            id,
            parent_id,
            name: format!("m{}", id),
            menu_type: MenuType::Html,
            board_id: None,
            external_url: None,
            display_order: order,
            depth,
            is_visible: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn descendants_get_parent_depth_plus_one() {
        let menus = vec![
            node(1, None, 1, 0),
            node(2, Some(1), 2, 0),
            node(3, Some(2), 3, 0),
            node(4, Some(2), 3, 1),
            node(5, None, 1, 1),
        ];
        let mut depths = descendant_depths(&menus, 1, 4);
        depths.sort();
        assert_eq!(depths, vec![(2, 5), (3, 6), (4, 6)]);
    }

    #[test]
    fn ancestry_is_root_first_and_survives_cycles() {
        let menus = vec![node(1, None, 1, 0), node(2, Some(1), 2, 0), node(3, Some(2), 3, 0)];
        let by_id: HashMap<i32, &MenuModel> = menus.iter().map(|m| (m.id, m)).collect();
        let ids: Vec<i32> = ancestry(&by_id, 3).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let looped = vec![node(1, Some(2), 1, 0), node(2, Some(1), 2, 0)];
        let by_id: HashMap<i32, &MenuModel> = looped.iter().map(|m| (m.id, m)).collect();
        assert_eq!(ancestry(&by_id, 1).len(), 2);
    }

    #[test]
    fn nav_orders_siblings_and_shows_type_fields_only() {
        let mut external = node(2, None, 1, 0);
        external.menu_type = MenuType::External;
        external.external_url = Some("https://example.org".into());
        external.board_id = Some(9);

        let menus = vec![node(1, None, 1, 5), external, node(3, Some(1), 2, 0)];
        let index = children_index(&menus);
        let tree = build_nav(
            None,
            &index,
            &HashMap::new(),
            &HashSet::from([3]),
            &mut HashSet::new(),
        );

        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(tree[0].url.as_deref(), Some("https://example.org"));
        assert_eq!(tree[0].board, None);
        assert_eq!(tree[1].has_content, Some(false));
        assert_eq!(tree[1].children[0].has_content, Some(true));
    }
}
