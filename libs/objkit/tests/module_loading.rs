//! Module loader: local and SUN paths, caching, circular detection.

mod common;

use common::{boot, insert};
use objkit::{kernel, Catalog, CoreError, Edit, SystemBuilder, Value};
use std::sync::Arc;

async fn system_with_code_root(root: &std::path::Path) -> Arc<objkit::System> {
    SystemBuilder::new(kernel::demo_store())
        .with_site(kernel::SITE)
        .with_code_root(root)
        .boot()
        .await
        .unwrap()
}

#[tokio::test]
async fn local_modules_load_with_their_imports() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.js"), "import \"./util.js\"\nmain()").unwrap();
    std::fs::write(dir.path().join("util.js"), "util()").unwrap();

    let system = system_with_code_root(dir.path()).await;
    let module = system.loader().load(&system, "main.js", None).await.unwrap();

    assert_eq!(module.path, "main.js");
    assert_eq!(module.imports, vec!["./util.js"]);
    assert!(module.source.contains("main()"));
}

#[tokio::test]
async fn reimporting_returns_the_same_module_instance() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("single.js"), "x()").unwrap();

    let system = system_with_code_root(dir.path()).await;
    let first = system.loader().load(&system, "single.js", None).await.unwrap();
    let second = system
        .loader()
        .load(&system, "./single.js", Some("main.js"))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn circular_imports_fail_with_the_full_chain() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.js"), "import \"./b.js\"").unwrap();
    std::fs::write(dir.path().join("b.js"), "import \"./a.js\"").unwrap();

    let system = system_with_code_root(dir.path()).await;

    let err = system.loader().load(&system, "a.js", None).await.unwrap_err();
    match &err {
        CoreError::CircularImport { chain } => {
            assert_eq!(chain, &["a.js".to_string(), "b.js".into(), "a.js".into()]);
        }
        other => panic!("unexpected {other:?}"),
    }

    // The failure leaves no partial module behind: a second, independent
    // load raises the same error instead of returning a husk.
    let err = system.loader().load(&system, "a.js", None).await.unwrap_err();
    assert!(matches!(err, CoreError::CircularImport { .. }));
}

#[tokio::test]
async fn missing_local_module_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let system = system_with_code_root(dir.path()).await;
    let err = system.loader().load(&system, "ghost.js", None).await.unwrap_err();
    assert!(matches!(err, CoreError::ModuleNotFound { .. }));
}

/// Mount a source-file object under /lib/<name> and return its id.
async fn mount_source(
    system: &Arc<objkit::System>,
    lib: catalog::ObjectId,
    name: &str,
    content: &str,
) {
    let id = insert(
        system,
        Catalog::new()
            .with("__category", Value::Ref(kernel::SOURCE_FILE_CATEGORY))
            .with("name", name)
            .with("content", content),
    )
    .await;
    system
        .submit_edits(
            lib,
            &[Edit::Insert {
                path: vec!["entries".into()],
                pos: 0,
                key: name.into(),
                value: Value::Ref(id),
            }],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn sun_modules_load_through_the_text_endpoint() {
    let system = boot().await;

    let lib = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(kernel::DIRECTORY_CATEGORY))
            .with("name", "lib")
            .with("entries", Catalog::new()),
    )
    .await;
    system
        .submit_edits(
            kernel::ROOT_DIRECTORY,
            &[Edit::Insert {
                path: vec!["entries".into()],
                pos: 0,
                key: "lib".into(),
                value: Value::Ref(lib),
            }],
        )
        .await
        .unwrap();

    mount_source(&system, lib, "dep.js", "export const dep = 1").await;
    mount_source(&system, lib, "main.js", "import \"/lib/dep.js\"\nrun()").await;

    let module = system
        .loader()
        .load(&system, "/lib/main.js", None)
        .await
        .unwrap();
    assert!(module.source.contains("run()"));
    assert_eq!(module.imports, vec!["/lib/dep.js"]);

    // The dependency landed in the cache as its own module.
    let dep = system.loader().load(&system, "/lib/dep.js", None).await.unwrap();
    assert!(dep.source.contains("dep = 1"));
}

#[tokio::test]
async fn sun_path_without_an_object_is_module_not_found() {
    let system = boot().await;
    let err = system
        .loader()
        .load(&system, "/nowhere/mod.js", None)
        .await
        .unwrap_err();
    // The routing tree reports the miss; the loader surfaces it.
    assert!(matches!(
        err,
        CoreError::UrlPathNotFound { .. } | CoreError::ModuleNotFound { .. }
    ));
}
