// Integration tests for dynamic resolution
//
// Each test builds a small in-memory workspace, resolves one dynamic edit,
// and checks which files were rewritten and how.

use std::future::Future;
use std::path::{Path, PathBuf};

use classmap_core::{
    Choice, Chooser, DiskStore, DynamicHint, DynamicRequest, DynamicResolver, Engine,
    EngineConfig, EngineReply, FailureKind, FixedChoice, HostMessage, MemoryStore, PassKind,
    Prompt,
};

/// Answers with a fixed choice and remembers what it was asked.
struct Scripted {
    answer: Choice,
    prompts: Vec<String>,
}

impl Scripted {
    fn new(answer: Choice) -> Self {
        Self {
            answer,
            prompts: Vec::new(),
        }
    }
}

impl Chooser for Scripted {
    fn choose(&mut self, prompt: Prompt<'_>) -> impl Future<Output = Choice> + Send {
        let asked = match prompt {
            Prompt::ActiveOrEverywhere { active, .. } => format!("active-or-everywhere {}", active.display()),
            Prompt::PickList { candidates } => format!("pick-list {}", candidates.len()),
        };
        self.prompts.push(asked);
        std::future::ready(self.answer)
    }
}

fn request<'a>(
    before: &'a str,
    after: &'a str,
    hint: &'a DynamicHint,
    active: Option<&'a Path>,
) -> DynamicRequest<'a> {
    DynamicRequest {
        before,
        after,
        hint,
        active,
    }
}

fn two_buttons() -> MemoryStore {
    MemoryStore::new("/ws")
        .with_file(
            "index.html",
            "<main></main>\n<script>\n  btn.className = \"btn btn-primary\";\n</script>\n",
        )
        .with_file(
            "src/other.js",
            "export const cls = \"btn btn-primary\";\n",
        )
}

#[tokio::test]
async fn test_scenario_b_only_active() {
    let store = two_buttons();
    let hint = DynamicHint::default();
    let active = PathBuf::from("/ws/index.html");
    let mut chooser = Scripted::new(Choice::OnlyActive);

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut chooser,
            request("btn btn-primary", "btn btn-secondary", &hint, Some(&active)),
        )
        .await
        .unwrap();

    assert_eq!(chooser.prompts, vec!["active-or-everywhere /ws/index.html"]);
    assert_eq!(outcome.changed_file_count(), 1);
    assert_eq!(outcome.constrained_to, Some(active.clone()));
    assert_eq!(store.writes(), vec![active]);
    assert!(store.get("index.html").unwrap().contains("\"btn btn-secondary\""));
    assert_eq!(
        store.get("src/other.js").as_deref(),
        Some("export const cls = \"btn btn-primary\";\n")
    );
}

#[tokio::test]
async fn test_scenario_b_everywhere_and_dismissed() {
    let hint = DynamicHint::default();
    let active = PathBuf::from("/ws/index.html");

    let store = two_buttons();
    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice(Choice::Everywhere),
            request("btn btn-primary", "btn", &hint, Some(&active)),
        )
        .await
        .unwrap();
    assert_eq!(outcome.changed_file_count(), 2);
    assert_eq!(outcome.constrained_to, None);
    assert_eq!(outcome.last_touched, Some(PathBuf::from("/ws/src/other.js")));

    let store = two_buttons();
    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice(Choice::Dismissed),
            request("btn btn-primary", "btn", &hint, Some(&active)),
        )
        .await
        .unwrap();
    assert!(outcome.declined);
    assert_eq!(outcome.changed_file_count(), 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_pick_list_without_active_document() {
    let store = two_buttons();
    let hint = DynamicHint::default();
    let mut chooser = Scripted::new(Choice::Pick(1));

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut chooser,
            request("btn btn-primary", "btn", &hint, None),
        )
        .await
        .unwrap();

    assert_eq!(chooser.prompts, vec!["pick-list 2"]);
    assert_eq!(outcome.changed_files, vec![PathBuf::from("/ws/src/other.js")]);
}

#[tokio::test]
async fn test_scenario_c_base_constant() {
    let store = MemoryStore::new("/ws")
        .with_file(
            "src/button.js",
            "const base = \"btn btn-primary large\";\nexport const button = () => base;\n",
        )
        .with_file("src/unrelated.js", "const greeting = \"hello world\";\n");
    let hint = DynamicHint::default();

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("btn btn-primary large", "btn btn-primary", &hint, None),
        )
        .await
        .unwrap();

    assert_eq!(outcome.changed_files, vec![PathBuf::from("/ws/src/button.js")]);
    assert_eq!(
        store.get("src/button.js").as_deref(),
        Some("const base = \"btn btn-primary\";\nexport const button = () => base;\n")
    );
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn test_base_constant_pass_on_composed_value() {
    let store = MemoryStore::new("/ws")
        .with_file(
            "src/button.js",
            "const base = 'btn large';\nel.className = base + ' btn-primary';\n",
        )
        .with_file("src/card.js", "const card = 'card shadow';\n");
    let hint = DynamicHint::default();

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("btn large btn-primary", "btn btn-primary", &hint, None),
        )
        .await
        .unwrap();

    assert_eq!(outcome.pass, Some(PassKind::BaseConstant));
    assert_eq!(
        store.get("src/button.js").as_deref(),
        Some("const base = 'btn';\nel.className = base + ' btn-primary';\n")
    );
    assert_eq!(store.writes(), vec![PathBuf::from("/ws/src/button.js")]);
}

#[tokio::test]
async fn test_scenario_d_no_match() {
    let store = MemoryStore::new("/ws")
        .with_file("index.html", r#"<div class="container"></div>"#)
        .with_file("app.js", "el.className = 'card';\n");
    let hint = DynamicHint {
        nearby_text: Some("Nothing near".into()),
        ..Default::default()
    };

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("ring-2 ring-offset-1", "ring-2", &hint, None),
        )
        .await
        .unwrap();

    assert!(outcome.is_no_match());
    assert_eq!(outcome.changed_file_count(), 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_token_set_tolerance() {
    let store = MemoryStore::new("/ws")
        .with_file("index.html", r#"<div class="p-4 flex"></div>"#)
        .with_file("app.js", "el.className = 'p-4   flex';\n");
    let hint = DynamicHint::default();

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("flex p-4", "flex p-8", &hint, None),
        )
        .await
        .unwrap();

    // exact pass sees nothing, tolerant markup pass rewrites the attribute
    assert_eq!(outcome.pass, Some(PassKind::TolerantMarkup));
    assert_eq!(
        store.get("index.html").as_deref(),
        Some(r#"<div class="flex p-8"></div>"#)
    );
    assert_eq!(store.get("app.js").as_deref(), Some("el.className = 'p-4   flex';\n"));

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("flex p-4", "flex p-8", &hint, None),
        )
        .await
        .unwrap();
    assert_eq!(outcome.pass, Some(PassKind::TolerantLiteral));
    assert_eq!(store.get("app.js").as_deref(), Some("el.className = 'flex p-8';\n"));
}

#[tokio::test]
async fn test_proximity_uses_rendered_text() {
    let store = MemoryStore::new("/ws").with_file(
        "app.js",
        "function badge() {\n  const el = document.createElement('span');\n  el.className = 'badge badge-info px-2';\n  el.textContent = 'New arrivals';\n  return el;\n}\n",
    );
    let hint = DynamicHint {
        nearby_text: Some("New arrivals".into()),
        tag_name: Some("span".into()),
        element_id: None,
    };

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("badge badge-info", "badge badge-warn", &hint, None),
        )
        .await
        .unwrap();

    assert_eq!(outcome.pass, Some(PassKind::Proximity));
    assert!(
        store
            .get("app.js")
            .unwrap()
            .contains("el.className = 'badge badge-warn';")
    );
}

#[tokio::test]
async fn test_linked_script_is_searched_after_active_document() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("js")).unwrap();
    std::fs::write(
        root.join("index.html"),
        r#"<div id="app"></div><script src="js/app.js"></script>"#,
    )
    .unwrap();
    std::fs::write(root.join("js/app.js"), "app.className = `grid gap-2`;\n").unwrap();

    let store = DiskStore::new(root);
    let mut engine = Engine::new(&EngineConfig::default(), store, FixedChoice::default());
    engine.open(root.join("index.html")).await;

    let response = engine
        .handle(HostMessage::ResolveDynamicEdit {
            before_value: "grid gap-2".into(),
            after_value: "grid gap-6".into(),
            hint: None,
            choice: None,
        })
        .await;

    match response.reply {
        EngineReply::Resolved {
            changed_file_count,
            last_touched_file,
            ..
        } => {
            assert_eq!(changed_file_count, 1);
            assert_eq!(last_touched_file, Some(root.join("js/app.js")));
        }
        other => panic!("unexpected reply {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(root.join("js/app.js")).unwrap(),
        "app.className = `grid gap-6`;\n"
    );
}

#[tokio::test]
async fn test_engine_reports_no_match() {
    let store = MemoryStore::new("/ws").with_file("index.html", "<p>plain</p>");
    let mut engine = Engine::new(&EngineConfig::default(), store, FixedChoice::default());
    engine.open("/ws/index.html").await;

    let response = engine
        .handle(HostMessage::ResolveDynamicEdit {
            before_value: "a b".into(),
            after_value: "a".into(),
            hint: None,
            choice: None,
        })
        .await;

    assert_eq!(
        response.reply,
        EngineReply::Resolved {
            changed_file_count: 0,
            last_touched_file: None,
            constrained_to: None,
            pass: None,
            unresolved: Some(FailureKind::NoMatchFound),
        }
    );
    assert_eq!(response.commands.len(), 1);
}

#[tokio::test]
async fn test_exact_pass_leaves_markup_text_alone() {
    let store = MemoryStore::new("/ws").with_file(
        "index.html",
        r#"<div id="card"></div><p>Say "card" twice</p><script>el.className = "card";</script>"#,
    );
    let hint = DynamicHint::default();

    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut FixedChoice::default(),
            request("card", "card shadow", &hint, None),
        )
        .await
        .unwrap();

    assert_eq!(outcome.pass, Some(PassKind::ExactLiteral));
    assert_eq!(
        store.get("index.html").as_deref(),
        Some(
            r#"<div id="card"></div><p>Say "card" twice</p><script>el.className = "card shadow";</script>"#
        )
    );
}

#[tokio::test]
async fn test_relative_root_counts_active_document_once() {
    // a relative root next to an absolute active path
    let dir = tempfile::tempdir_in(".").unwrap();
    let relative_root = dir.path().to_path_buf();
    assert!(relative_root.is_relative());
    let active = std::env::current_dir()
        .unwrap()
        .join(&relative_root)
        .join("index.html");
    std::fs::write(&active, "<script>el.className = 'tag';</script>").unwrap();
    std::fs::write(relative_root.join("app.js"), "x.className = 'tag';\n").unwrap();

    let store = DiskStore::new(&relative_root);
    let hint = DynamicHint::default();
    let mut chooser = Scripted::new(Choice::Everywhere);
    let outcome = DynamicResolver::default()
        .resolve(
            &store,
            &mut chooser,
            request("tag", "tag big", &hint, Some(&active)),
        )
        .await
        .unwrap();

    assert_eq!(chooser.prompts.len(), 1);
    assert_eq!(outcome.changed_file_count(), 2);
    assert!(outcome.touched(&active));
    assert_eq!(
        std::fs::read_to_string(&active).unwrap(),
        "<script>el.className = 'tag big';</script>"
    );
}
