mod common;

use church_cms::models::MenuType;
use church_cms::services::menu::{MenuChanges, MenuService, NewMenu};
use church_cms::AppError;
use serde_json::Value;

fn html_menu(parent_id: Option<i32>, name: &str) -> NewMenu {
    NewMenu {
        parent_id,
        name: name.to_string(),
        menu_type: MenuType::Html,
        board_id: None,
        external_url: None,
        content: None,
        display_order: None,
        is_visible: None,
    }
}

async fn create_menu(app: &common::TestApp, body: Value) -> Value {
    let resp = app
        .client
        .post(app.url("/admin/menus"))
        .bearer_auth(common::editor_token())
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(status, 200, "menu creation failed: {}", body);
    body["data"].clone()
}

#[tokio::test]
async fn depth_follows_the_parent() {
    let db = common::test_db().await;
    let service = MenuService::new(db);

    let about = service.create(html_menu(None, "교회소개")).await.unwrap();
    let history = service
        .create(html_menu(Some(about.id), "연혁"))
        .await
        .unwrap();
    let detail = service
        .create(html_menu(Some(history.id), "1980년대"))
        .await
        .unwrap();

    assert_eq!(about.depth, 1);
    assert_eq!(history.depth, 2);
    assert_eq!(detail.depth, 3);

    let missing = service.create(html_menu(Some(9999), "orphan")).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
}

#[tokio::test]
async fn reparent_rewrites_subtree_depths() {
    let db = common::test_db().await;
    let service = MenuService::new(db);

    let a = service.create(html_menu(None, "A")).await.unwrap();
    let b = service.create(html_menu(None, "B")).await.unwrap();
    let b1 = service.create(html_menu(Some(b.id), "B1")).await.unwrap();
    let b11 = service.create(html_menu(Some(b1.id), "B11")).await.unwrap();

    let moved = service.reparent(b.id, Some(a.id)).await.unwrap();
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.parent_id, Some(a.id));
    assert_eq!(service.get_by_id(b1.id).await.unwrap().depth, 3);
    assert_eq!(service.get_by_id(b11.id).await.unwrap().depth, 4);

    // Back to the root level
    service
        .update(
            b.id,
            MenuChanges {
                parent_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(service.get_by_id(b.id).await.unwrap().depth, 1);
    assert_eq!(service.get_by_id(b11.id).await.unwrap().depth, 3);
}

#[tokio::test]
async fn reparent_refuses_cycles() {
    let db = common::test_db().await;
    let service = MenuService::new(db);

    let root = service.create(html_menu(None, "root")).await.unwrap();
    let child = service.create(html_menu(Some(root.id), "child")).await.unwrap();
    let grandchild = service
        .create(html_menu(Some(child.id), "grandchild"))
        .await
        .unwrap();

    let own = service.reparent(root.id, Some(root.id)).await;
    assert!(matches!(own, Err(AppError::Validation(_))));

    let under_descendant = service.reparent(root.id, Some(grandchild.id)).await;
    assert!(matches!(under_descendant, Err(AppError::Validation(_))));

    let missing = service.reparent(child.id, Some(4242)).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Nothing moved
    let root = service.get_by_id(root.id).await.unwrap();
    assert_eq!(root.parent_id, None);
    assert_eq!(root.depth, 1);
}

#[tokio::test]
async fn cycle_over_http_is_a_bad_request() {
    let app = common::spawn_app().await;
    let parent = create_menu(&app, serde_json::json!({ "name": "P", "menu_type": "html" })).await;
    let child = create_menu(
        &app,
        serde_json::json!({ "name": "C", "menu_type": "html", "parent_id": parent["id"] }),
    )
    .await;

    let resp = app
        .client
        .put(app.url(&format!("/admin/menus/{}", parent["id"])))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "parent_id": child["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Leaving parent_id out does not move the node
    let resp = app
        .client
        .put(app.url(&format!("/admin/menus/{}", child["id"])))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "name": "Renamed" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["parent_id"], parent["id"]);
    assert_eq!(body["data"]["name"], "Renamed");

    // An explicit null does
    let resp = app
        .client
        .put(app.url(&format!("/admin/menus/{}", child["id"])))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "parent_id": null }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["parent_id"].is_null());
    assert_eq!(body["data"]["depth"], 1);
}

#[tokio::test]
async fn path_runs_from_root_to_node() {
    let db = common::test_db().await;
    let service = MenuService::new(db);

    let a = service.create(html_menu(None, "예배")).await.unwrap();
    let b = service.create(html_menu(Some(a.id), "주일예배")).await.unwrap();
    let c = service.create(html_menu(Some(b.id), "1부")).await.unwrap();

    let names: Vec<String> = service
        .path(c.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["예배", "주일예배", "1부"]);

    assert!(matches!(service.path(777).await, Err(AppError::NotFound)));
}

#[tokio::test]
async fn deleting_a_node_removes_its_subtree() {
    let db = common::test_db().await;
    let service = MenuService::new(db);

    let a = service.create(html_menu(None, "A")).await.unwrap();
    let a1 = service.create(html_menu(Some(a.id), "A1")).await.unwrap();
    let a11 = service.create(html_menu(Some(a1.id), "A11")).await.unwrap();
    service.set_content(a11.id, "<p>deep</p>".into()).await.unwrap();
    let b = service.create(html_menu(None, "B")).await.unwrap();

    service.delete(a.id).await.unwrap();

    assert!(matches!(service.get_by_id(a1.id).await, Err(AppError::NotFound)));
    assert!(matches!(service.get_by_id(a11.id).await, Err(AppError::NotFound)));
    assert!(service.get_by_id(b.id).await.is_ok());
    assert_eq!(service.count().await.unwrap(), 1);

    assert!(matches!(service.delete(a.id).await, Err(AppError::NotFound)));
}

#[tokio::test]
async fn navigation_shows_only_the_field_of_each_type() {
    let app = common::spawn_app().await;
    let board = common::create_board(&app, serde_json::json!({ "code": "notice", "name": "공지사항" })).await;

    let news = create_menu(
        &app,
        serde_json::json!({ "name": "교회소식", "menu_type": "html", "display_order": 1 }),
    )
    .await;
    create_menu(
        &app,
        serde_json::json!({
            "name": "공지",
            "menu_type": "board",
            "board_id": board["id"],
            "parent_id": news["id"],
        }),
    )
    .await;
    create_menu(
        &app,
        serde_json::json!({
            "name": "유튜브",
            "menu_type": "external",
            "external_url": "https://youtube.com/@church",
            "display_order": 2,
        }),
    )
    .await;
    let vision = create_menu(
        &app,
        serde_json::json!({
            "name": "비전",
            "menu_type": "html",
            "content": "<h1>우리의 비전</h1>",
            "display_order": 0,
        }),
    )
    .await;
    create_menu(
        &app,
        serde_json::json!({ "name": "숨김", "menu_type": "html", "is_visible": false }),
    )
    .await;

    let resp = app.client.get(app.url("/menus")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let roots = body["data"].as_array().unwrap();

    let names: Vec<&str> = roots.iter().map(|n| n["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["비전", "교회소식", "유튜브"]);

    assert_eq!(roots[0]["id"], vision["id"]);
    assert_eq!(roots[0]["has_content"], true);
    assert!(roots[0].get("content").is_none());
    assert!(roots[0].get("url").is_none());

    assert_eq!(roots[1]["has_content"], false);
    let board_node = &roots[1]["children"][0];
    assert_eq!(board_node["board"]["code"], "notice");
    assert_eq!(board_node["depth"], 2);
    assert!(board_node.get("url").is_none());
    assert!(board_node.get("has_content").is_none());

    assert_eq!(roots[2]["url"], "https://youtube.com/@church");
    assert!(roots[2].get("board").is_none());

    let resp = app
        .client
        .get(app.url("/boards/notice/menu"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["name"], "공지");
}

#[tokio::test]
async fn menu_detail_carries_content_and_breadcrumb() {
    let app = common::spawn_app().await;
    let parent = create_menu(&app, serde_json::json!({ "name": "교회소개", "menu_type": "html" })).await;
    let child = create_menu(
        &app,
        serde_json::json!({
            "name": "섬기는 사람들",
            "menu_type": "html",
            "parent_id": parent["id"],
            "content": "<p>담임목사</p>",
        }),
    )
    .await;

    let resp = app
        .client
        .get(app.url(&format!("/menus/{}", child["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["content"], "<p>담임목사</p>");
    assert_eq!(body["data"]["depth"], 2);
    let crumbs: Vec<&str> = body["data"]["path"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(crumbs, vec!["교회소개", "섬기는 사람들"]);

    // Replacing the content keeps a single body
    let resp = app
        .client
        .put(app.url(&format!("/admin/menus/{}/content", child["id"])))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "content": "<p>교역자</p>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = app
        .client
        .get(app.url(&format!("/menus/{}", child["id"])))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["content"], "<p>교역자</p>");
}

#[tokio::test]
async fn hidden_menu_is_not_found_for_visitors() {
    let app = common::spawn_app().await;
    let hidden = create_menu(
        &app,
        serde_json::json!({ "name": "준비중", "menu_type": "html", "is_visible": false }),
    )
    .await;

    let resp = app
        .client
        .get(app.url(&format!("/menus/{}", hidden["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app
        .client
        .get(app.url("/admin/menus"))
        .bearer_auth(common::editor_token())
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn content_only_goes_on_html_menus() {
    let app = common::spawn_app().await;
    let external = create_menu(
        &app,
        serde_json::json!({
            "name": "Live",
            "menu_type": "external",
            "external_url": "https://example.org/live",
        }),
    )
    .await;

    let resp = app
        .client
        .put(app.url(&format!("/admin/menus/{}/content", external["id"])))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "content": "<p>x</p>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn typed_menus_need_their_target() {
    let app = common::spawn_app().await;

    for payload in [
        serde_json::json!({ "name": "Board", "menu_type": "board" }),
        serde_json::json!({ "name": "Link", "menu_type": "external" }),
        serde_json::json!({ "name": "Link", "menu_type": "external", "external_url": "not a url" }),
        serde_json::json!({ "name": "", "menu_type": "html" }),
    ] {
        let resp = app
            .client
            .post(app.url("/admin/menus"))
            .bearer_auth(common::editor_token())
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "payload accepted: {}", payload);
    }

    let resp = app
        .client
        .post(app.url("/admin/menus"))
        .bearer_auth(common::editor_token())
        .json(&serde_json::json!({ "name": "Board", "menu_type": "board", "board_id": 404 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn roots_and_children_skip_hidden_nodes() {
    let db = common::test_db().await;
    let service = MenuService::new(db.clone());

    let second = service
        .create(NewMenu {
            display_order: Some(2),
            ..html_menu(None, "second")
        })
        .await
        .unwrap();
    let first = service
        .create(NewMenu {
            display_order: Some(1),
            ..html_menu(None, "first")
        })
        .await
        .unwrap();
    service
        .create(NewMenu {
            is_visible: Some(false),
            ..html_menu(None, "hidden")
        })
        .await
        .unwrap();
    let child_b = service.create(html_menu(Some(first.id), "b")).await.unwrap();
    let child_a = service.create(html_menu(Some(first.id), "a")).await.unwrap();

    let roots: Vec<i32> = service.roots().await.unwrap().iter().map(|m| m.id).collect();
    assert_eq!(roots, vec![first.id, second.id]);

    // Equal display order falls back to creation order
    let children: Vec<i32> = service
        .children(first.id)
        .await
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(children, vec![child_b.id, child_a.id]);

    service.set_display_order(child_b.id, 9).await.unwrap();
    let children: Vec<i32> = service
        .children(first.id)
        .await
        .unwrap()
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(children, vec![child_a.id, child_b.id]);

    assert!(service.children(second.id).await.unwrap().is_empty());
    assert_eq!(service.by_depth(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn lookups_by_type_and_board() {
    let db = common::test_db().await;
    let boards = church_cms::services::board::BoardService::new(db.clone());
    let board = boards
        .create(church_cms::services::board::NewBoard {
            code: "sermon".into(),
            name: "설교".into(),
            board_type: church_cms::models::BoardType::General,
            description: None,
            display_order: None,
            is_visible: None,
            posts_per_page: None,
            allow_attachment: None,
            require_auth: None,
        })
        .await
        .unwrap();

    let service = MenuService::new(db);
    let menu = service
        .create(NewMenu {
            menu_type: MenuType::Board,
            board_id: Some(board.id),
            ..html_menu(None, "설교")
        })
        .await
        .unwrap();
    service.create(html_menu(None, "소개")).await.unwrap();

    assert_eq!(service.by_board(board.id).await.unwrap().unwrap().id, menu.id);
    assert!(service.by_board(board.id + 1).await.unwrap().is_none());
    assert_eq!(service.by_type(MenuType::Html).await.unwrap().len(), 1);
    assert_eq!(service.by_type(MenuType::External).await.unwrap().len(), 0);

    // Switching type keeps the old board id but no longer exposes it
    let switched = service
        .update(
            menu.id,
            MenuChanges {
                menu_type: Some(MenuType::Html),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(switched.board_id, Some(board.id));
    let nav = service.navigation().await.unwrap();
    let node = nav.iter().find(|n| n.id == menu.id).unwrap();
    assert!(node.board.is_none());
    assert_eq!(node.has_content, Some(false));
}
