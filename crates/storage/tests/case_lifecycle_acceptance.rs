use shared::domain::CaseStatus;
use storage::Storage;

#[tokio::test]
async fn case_items_survive_reopen_of_file_database() {
    let temp_root = tempfile::tempdir().expect("temp dir");
    let database_url = format!(
        "sqlite://{}",
        temp_root
            .path()
            .join("nested")
            .join("workbench.db")
            .to_string_lossy()
            .replace('\\', "/")
    );

    let case_id = {
        let storage = Storage::new(&database_url).await.expect("db");
        storage
            .upsert_product("P-1", "Bolt")
            .await
            .expect("product");
        let case_id = storage.create_case("bolts").await.expect("case");
        storage
            .create_item(&case_id, Some("P-1"), 4)
            .await
            .expect("item");
        storage
            .set_case_status(&case_id, CaseStatus::SubmittedToVendor)
            .await
            .expect("submit");
        storage.pool().close().await;
        case_id
    };

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let items = reopened
        .list_items_for_case(&case_id)
        .await
        .expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 4);
    assert_eq!(
        reopened.load_case(&case_id).await.expect("case").status,
        CaseStatus::SubmittedToVendor
    );
    let order = reopened
        .create_order_for_case(&case_id)
        .await
        .expect("order");
    assert_eq!(
        reopened
            .order_for_case(&case_id)
            .await
            .expect("lookup")
            .map(|found| found.order_number),
        Some(order.order_number)
    );

    reopened.pool().close().await;
}
