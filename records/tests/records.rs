//! End-to-end tests of the record layer against the in-memory engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use okv::{BytesRange, Database, MemoryDatabase, RangeOptions, Transaction};
use tokio_util::sync::CancellationToken;

use records::testing::{
    as_test_record, test_record_type, TestRecord, TAG_INDEX_TYPE_ID, TEST_RECORD_TYPE_ID,
};
use records::{Config, Cursor, Error, Record, RecordStore, SelectOptions, CHUNK_TYPE_ID};

const DB_ID: u16 = 1;

fn small_config() -> Config {
    Config {
        gzip_threshold: 16,
        chunk_size: 64,
    }
}

/// Deterministic, effectively incompressible byte stream.
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x9E3779B9_u64;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        })
        .collect()
}

async fn open_store(db: &Arc<MemoryDatabase>) -> (Arc<dyn Transaction>, RecordStore) {
    let tx = db.begin().await.unwrap();
    let store = RecordStore::with_config(DB_ID, Arc::clone(&tx), small_config());
    (tx, store)
}

/// All keys of one type id, read in a fresh transaction.
async fn keys_of_type(db: &Arc<MemoryDatabase>, type_id: u16) -> Vec<Bytes> {
    let tx = db.begin().await.unwrap();
    let prefix = {
        let mut p = DB_ID.to_be_bytes().to_vec();
        p.extend_from_slice(&type_id.to_be_bytes());
        Bytes::from(p)
    };
    tx.get_range(BytesRange::prefix(prefix), RangeOptions::default())
        .await
        .unwrap()
        .into_iter()
        .map(|kv| kv.key)
        .collect()
}

#[tokio::test]
async fn should_roundtrip_record_through_save_and_load() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut original = TestRecord::new("u-1")
        .with_name("alice")
        .with_tags(&["blue", "large"])
        .with_payload(vec![7; 32]);

    // when
    store
        .save(None, &mut [&mut original as &mut dyn Record])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let (_, store) = open_store(&db).await;
    let mut loaded = TestRecord::new("u-1");
    store
        .load(None, &mut [&mut loaded as &mut dyn Record])
        .await
        .unwrap();

    // then
    assert_eq!(loaded.marshal().unwrap(), original.marshal().unwrap());
}

#[tokio::test]
async fn should_select_ids_in_key_order() {
    // given - scenario A: two records of type 42 with empty bodies
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut a = TestRecord::new("a");
    let mut b = TestRecord::new("b");
    store
        .save(
            None,
            &mut [&mut a as &mut dyn Record, &mut b as &mut dyn Record],
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // when
    let (_, store) = open_store(&db).await;
    let ids = store
        .select_ids(TEST_RECORD_TYPE_ID, SelectOptions::new())
        .await
        .unwrap();

    // then
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn should_leave_no_chunks_after_dropping_chunked_record() {
    // given - scenario B: an incompressible body over twice the chunk size
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut record = TestRecord::new("big").with_payload(noise(64 * 2 + 5));
    store
        .save(None, &mut [&mut record as &mut dyn Record])
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert!(!keys_of_type(&db, CHUNK_TYPE_ID).await.is_empty());

    // when
    let (tx, store) = open_store(&db).await;
    let mut doomed = TestRecord::new("big");
    store
        .drop(None, &mut [&mut doomed as &mut dyn Record])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // then - the chunk sub-keyspace is empty and the record is gone
    assert!(keys_of_type(&db, CHUNK_TYPE_ID).await.is_empty());
    let (_, store) = open_store(&db).await;
    let mut absent = TestRecord::new("big");
    let result = store.load(None, &mut [&mut absent as &mut dyn Record]).await;
    assert_eq!(result, Err(Error::RecordNotFound));
}

#[tokio::test]
async fn should_replace_index_entries_on_update() {
    // given - scenario C: R declares {x, y}, then {y, z}
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut record = TestRecord::new("r").with_tags(&["x", "y"]);
    store
        .save(None, &mut [&mut record as &mut dyn Record])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // when
    let (tx, store) = open_store(&db).await;
    let mut updated = TestRecord::new("r").with_tags(&["y", "z"]);
    store
        .save(None, &mut [&mut updated as &mut dyn Record])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // then - exactly y and z remain, both pointing at r
    let index_keys = keys_of_type(&db, TAG_INDEX_TYPE_ID).await;
    let expected_key = |tag: &str| {
        let mut k = DB_ID.to_be_bytes().to_vec();
        k.extend_from_slice(&TAG_INDEX_TYPE_ID.to_be_bytes());
        k.extend_from_slice(tag.as_bytes());
        k.extend_from_slice(b"r");
        k.push(1);
        Bytes::from(k)
    };
    assert_eq!(index_keys, vec![expected_key("y"), expected_key("z")]);
}

#[tokio::test]
async fn should_select_largest_ids_with_prefix_reverse_and_limit() {
    // given - scenario D: ten ids sharing the prefix 0x01 0x02
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..10 {
        let id = format!("\u{01}\u{02}{}", i);
        let mut record = TestRecord::new(id).with_name(format!("n{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when
    let (_, store) = open_store(&db).await;
    let selected = store
        .select(
            test_record_type(),
            SelectOptions::new()
                .query(Bytes::from_static(&[0x01, 0x02]))
                .reverse()
                .limit(3),
        )
        .await
        .unwrap();

    // then - the three lexicographically largest, in descending order
    let ids: Vec<String> = selected.iter().map(|r| r.id()).collect();
    assert_eq!(
        ids,
        vec![
            "\u{01}\u{02}9".to_string(),
            "\u{01}\u{02}8".to_string(),
            "\u{01}\u{02}7".to_string(),
        ]
    );
}

#[tokio::test]
async fn should_abort_selection_when_predicate_fails() {
    // given - scenario E: the predicate raises on the fifth record
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..10 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when
    let (_, store) = open_store(&db).await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let result = store
        .select(
            test_record_type(),
            SelectOptions::new().filter(move |_: &dyn Record| {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                    Err(Error::User("boom".to_string()))
                } else {
                    Ok(true)
                }
            }),
        )
        .await;

    // then - the scan aborts with the user error, no partial list
    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("expected the predicate error to abort the scan"),
    };
    assert_eq!(err, Error::User("boom".to_string()));
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn should_honor_not_found_handler_on_load() {
    // given - scenario F
    let db = Arc::new(MemoryDatabase::new());
    let (_, store) = open_store(&db).await;
    let untouched = TestRecord::new("ghost").with_name("default");

    // when - a handler accepting the absence succeeds
    let mut record = untouched.clone();
    store
        .load(
            Some(&|_: &mut dyn Record| Ok(())),
            &mut [&mut record as &mut dyn Record],
        )
        .await
        .unwrap();

    // then - the record is untouched
    assert_eq!(record, untouched);

    // and without a handler the load fails
    let mut record = untouched.clone();
    let result = store.load(None, &mut [&mut record as &mut dyn Record]).await;
    assert_eq!(result, Err(Error::RecordNotFound));
}

#[tokio::test]
async fn should_run_exists_handler_and_abort_save() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut record = TestRecord::new("dup").with_name("first");
    store
        .save(None, &mut [&mut record as &mut dyn Record])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // when - the handler refuses overwrites
    let (_, store) = open_store(&db).await;
    let mut again = TestRecord::new("dup").with_name("second");
    let result = store
        .save(
            Some(&|_: &mut dyn Record| Err(Error::User("record exists".to_string()))),
            &mut [&mut again as &mut dyn Record],
        )
        .await;

    // then
    assert_eq!(result, Err(Error::User("record exists".to_string())));
}

#[tokio::test]
async fn should_silently_drop_absent_record() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (_, store) = open_store(&db).await;

    // when
    let mut ghost = TestRecord::new("ghost");
    let silent = store.drop(None, &mut [&mut ghost as &mut dyn Record]).await;

    // then - silent by default, strict with a refusing handler
    assert!(silent.is_ok());
    let mut ghost = TestRecord::new("ghost");
    let strict = store
        .drop(
            Some(&|_: &mut dyn Record| Err(Error::User("missing".to_string()))),
            &mut [&mut ghost as &mut dyn Record],
        )
        .await;
    assert_eq!(strict, Err(Error::User("missing".to_string())));
}

#[tokio::test]
async fn should_materialize_records_through_index_scan() {
    // given - records reachable only through their tag entries
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut r1 = TestRecord::new("r1").with_name("red one").with_tags(&["red"]);
    let mut r2 = TestRecord::new("r2")
        .with_name("blue one")
        .with_tags(&["blue"]);
    store
        .save(
            None,
            &mut [&mut r1 as &mut dyn Record, &mut r2 as &mut dyn Record],
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // when - scan the index type; rows carry only ids
    let (_, store) = open_store(&db).await;
    let selected = store
        .select(
            test_record_type(),
            SelectOptions::new().by_index(TAG_INDEX_TYPE_ID),
        )
        .await
        .unwrap();

    // then - bodies are hydrated via the second fetch, in index-key order
    assert_eq!(selected.len(), 2);
    assert_eq!(as_test_record(selected[0].as_ref()).name, "blue one");
    assert_eq!(as_test_record(selected[1].as_ref()).name, "red one");
}

#[tokio::test]
async fn should_filter_records_post_unmarshal() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..6 {
        let mut record = TestRecord::new(format!("r{}", i)).with_name(if i % 2 == 0 {
            "even"
        } else {
            "odd"
        });
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when
    let (_, store) = open_store(&db).await;
    let selected = store
        .select(
            test_record_type(),
            SelectOptions::new().filter(|record: &dyn Record| Ok(as_test_record(record).name == "odd")),
        )
        .await
        .unwrap();

    // then
    let ids: Vec<String> = selected.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["r1".to_string(), "r3".to_string(), "r5".to_string()]);
}

#[tokio::test]
async fn should_clear_whole_type() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..3 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }

    // when
    store.clear_type(TEST_RECORD_TYPE_ID);
    tx.commit().await.unwrap();

    // then
    assert!(keys_of_type(&db, TEST_RECORD_TYPE_ID).await.is_empty());
}

#[tokio::test]
async fn should_apply_and_retire_ad_hoc_index_entries() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;

    // when - declare entries for two records by hand
    store
        .index(&|idx| {
            idx.add(TAG_INDEX_TYPE_ID, Bytes::from_static(b"green"));
            Ok(())
        }, "r1", false)
        .unwrap();
    store
        .index(&|idx| {
            idx.add(TAG_INDEX_TYPE_ID, Bytes::from_static(b"green"));
            Ok(())
        }, "r2", false)
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(keys_of_type(&db, TAG_INDEX_TYPE_ID).await.len(), 2);

    // and retire the index key wholesale
    let (tx, store) = open_store(&db).await;
    store
        .clear_index(&|idx| {
            idx.add(TAG_INDEX_TYPE_ID, Bytes::from_static(b"green"));
            Ok(())
        })
        .unwrap();
    tx.commit().await.unwrap();

    // then
    assert!(keys_of_type(&db, TAG_INDEX_TYPE_ID).await.is_empty());
}

#[tokio::test]
async fn should_page_forward_with_cursor() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..10 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when
    let (tx, store) = open_store(&db).await;
    let mut cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(4));
    let first: Vec<String> = cursor
        .next(&store, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    let second: Vec<String> = cursor
        .next(&store, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    let third: Vec<String> = cursor
        .next(&store, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    tx.commit().await.unwrap();

    // then - the under-filled third page exhausts the cursor immediately
    assert_eq!(first, vec!["r0", "r1", "r2", "r3"]);
    assert_eq!(second, vec!["r4", "r5", "r6", "r7"]);
    assert_eq!(third, vec!["r8", "r9"]);
    assert!(cursor.is_empty());
    assert!(cursor.next(&store, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn should_skip_pages_on_next() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..9 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when - skip one whole page
    let (_, store) = open_store(&db).await;
    let mut cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(3));
    let page: Vec<String> = cursor
        .next(&store, 1)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();

    // then
    assert_eq!(page, vec!["r3", "r4", "r5"]);
}

#[tokio::test]
async fn should_page_backward_with_cursor() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..6 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when
    let (_, store) = open_store(&db).await;
    let mut cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(4));
    let page: Vec<String> = cursor
        .prev(&store, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();

    // then - the last page, in descending order
    assert_eq!(page, vec!["r5", "r4", "r3", "r2"]);
}

#[tokio::test]
async fn should_resume_cursor_across_transactions() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..6 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when - take one page, commit, reopen in a fresh transaction
    let (tx, store) = open_store(&db).await;
    let mut cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(2));
    let cursor_id = cursor.id().to_string();
    let first: Vec<String> = cursor
        .next(&store, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    tx.commit().await.unwrap();

    let (tx, store) = open_store(&db).await;
    let mut reopened = Cursor::open(&store, &cursor_id, test_record_type())
        .await
        .unwrap();
    let second: Vec<String> = reopened
        .next(&store, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    tx.commit().await.unwrap();

    // then
    assert_eq!(first, vec!["r0", "r1"]);
    assert_eq!(second, vec!["r2", "r3"]);
}

#[tokio::test]
async fn should_reject_cursor_open_with_wrong_type() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(2));
    let cursor_id = cursor.id().to_string();
    cursor.next(&store, 0).await.unwrap();
    tx.commit().await.unwrap();

    // when - reopen claiming a different record type
    let (_, store) = open_store(&db).await;
    let wrong_type = records::RecordType {
        id: 77,
        new: |id| Box::new(TestRecord::new(id)),
    };
    let result = Cursor::open(&store, &cursor_id, wrong_type).await;

    // then
    assert!(matches!(result, Err(Error::InvalidValue(_))));
}

#[tokio::test]
async fn should_stream_all_records_from_cursor() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..7 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when - stream with a page smaller than the record count
    let (_, store) = open_store(&db).await;
    let cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(3));
    let database: Arc<dyn Database> = db.clone();
    let mut stream = cursor.select_stream(database, CancellationToken::new());

    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.unwrap().id());
    }

    // then
    let expected: Vec<String> = (0..7).map(|i| format!("r{}", i)).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn should_stop_stream_when_cancelled() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    for i in 0..5 {
        let mut record = TestRecord::new(format!("r{}", i));
        store
            .save(None, &mut [&mut record as &mut dyn Record])
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    // when - the token is cancelled before the stream starts
    let (_, store) = open_store(&db).await;
    let cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(2));
    let token = CancellationToken::new();
    token.cancel();
    let mut stream = cursor.select_stream(db.clone() as Arc<dyn Database>, token);

    // then
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn should_delete_cursor_record_on_close() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;
    let mut record = TestRecord::new("r0");
    store
        .save(None, &mut [&mut record as &mut dyn Record])
        .await
        .unwrap();
    let mut cursor = Cursor::create(&store, test_record_type(), SelectOptions::new().page(1));
    let cursor_id = cursor.id().to_string();
    cursor.next(&store, 0).await.unwrap();
    tx.commit().await.unwrap();

    // when
    let (tx, store) = open_store(&db).await;
    let mut cursor = Cursor::open(&store, &cursor_id, test_record_type())
        .await
        .unwrap();
    cursor.close(&store).await.unwrap();
    tx.commit().await.unwrap();

    // then
    assert!(cursor.is_empty());
    let (_, store) = open_store(&db).await;
    let stored = store
        .get(records::CURSOR_TYPE_ID, &cursor_id)
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn should_keep_raw_crud_free_of_pipeline_and_indexing() {
    // given
    let db = Arc::new(MemoryDatabase::new());
    let (tx, store) = open_store(&db).await;

    // when - raw bytes under an arbitrary type
    store.put(7, "raw", Bytes::from_static(b"bytes")).unwrap();
    tx.commit().await.unwrap();

    // then - returned verbatim, no flag byte, no index rows
    let (tx, store) = open_store(&db).await;
    assert_eq!(
        store.get(7, "raw").await.unwrap(),
        Some(Bytes::from_static(b"bytes"))
    );
    assert!(keys_of_type(&db, TAG_INDEX_TYPE_ID).await.is_empty());

    // and delete removes the key
    store.delete(7, "raw").unwrap();
    tx.commit().await.unwrap();
    let (_, store) = open_store(&db).await;
    assert!(store.get(7, "raw").await.unwrap().is_none());
}
