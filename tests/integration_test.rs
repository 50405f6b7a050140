use bytes::Bytes;
use chunkvault::crypto::{generate_hash, separate_iv_and_data, KeyManager};
use chunkvault::model::FileChunk;
use chunkvault::{ChunkVault, Database, DfsConfig, NewFile};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_vault(db: Database, chunk_size: usize) -> ChunkVault {
    ChunkVault::open(db, DfsConfig::default().with_chunk_size(chunk_size))
        .await
        .unwrap()
}

/// Ingest a 3-chunk file, decrypt it piece by piece, then delete it
#[tokio::test]
async fn test_three_chunk_scenario() {
    let db = Database::in_memory();
    let vault = open_vault(db.clone(), 3).await;

    let metadata = vault
        .ingest(NewFile::new("abc.txt", &b"AAABBBCCC"[..]).with_file_id("f1"))
        .await
        .unwrap();
    assert_eq!(db.get_metadata("f1").await.unwrap().unwrap().chunks.len(), 3);

    // Store order is not reassembly order; walk the metadata instead
    let keys = KeyManager::new(db.clone());
    let mut reassembled = Vec::new();
    for (index, placement) in metadata.chunks.iter().enumerate() {
        let chunk = db.get_chunk(&placement.chunk_id).await.unwrap().unwrap();
        assert_eq!(chunk.index as usize, index);

        let (iv, ciphertext) = separate_iv_and_data(&chunk.data).unwrap();
        reassembled.extend(keys.decrypt(ciphertext, iv).await.unwrap());
    }
    assert_eq!(reassembled, b"AAABBBCCC");

    db.delete_metadata("f1").await.unwrap();
    db.delete_chunks_for_file("f1").await.unwrap();

    assert!(db.get_metadata("f1").await.unwrap().is_none());
    assert!(db.get_chunks_for_file("f1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_committed_metadata_references_stored_chunks() {
    let db = Database::in_memory();
    let vault = open_vault(db.clone(), 16).await;

    let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
    let metadata = vault
        .ingest(NewFile::new("blob.bin", data).with_file_id("blob"))
        .await
        .unwrap();

    let stored: HashSet<String> = db
        .get_chunks_for_file("blob")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.chunk_id)
        .collect();

    for chunk_id in metadata.chunk_ids() {
        assert!(stored.contains(chunk_id), "metadata references missing chunk {}", chunk_id);
    }
}

#[tokio::test]
async fn test_delete_leaves_other_files_intact() {
    let db = Database::in_memory();
    let vault = open_vault(db.clone(), 3).await;

    vault
        .ingest(NewFile::new("one", &b"AAABBB"[..]).with_file_id("one"))
        .await
        .unwrap();
    vault
        .ingest(NewFile::new("two", &b"BBBCCC"[..]).with_file_id("two"))
        .await
        .unwrap();

    assert!(vault.delete_file("one").await.unwrap());
    assert!(!vault.delete_file("one").await.unwrap());

    assert!(db.get_chunks_for_file("one").await.unwrap().is_empty());
    assert_eq!(db.get_chunks_for_file("two").await.unwrap().len(), 2);
    assert_eq!(vault.read_file("two").await.unwrap().as_ref(), b"BBBCCC");
}

#[tokio::test]
async fn test_dedup_ids_follow_plaintext() {
    let db = Database::in_memory();
    let vault = open_vault(db.clone(), 3).await;

    let a = vault
        .ingest(NewFile::new("a", &b"AAA"[..]).with_file_id("a"))
        .await
        .unwrap();
    let b = vault
        .ingest(NewFile::new("b", &b"AAA"[..]).with_file_id("b"))
        .await
        .unwrap();

    assert_eq!(a.chunks[0].chunk_id, generate_hash(b"AAA"));
    assert_eq!(a.chunks[0].chunk_id, b.chunks[0].chunk_id);
    assert_eq!(db.stats().await.unwrap().chunks, 1);
}

#[tokio::test]
async fn test_vault_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.db");

    let payload = Bytes::from(vec![42u8; 10_000]);
    {
        let vault = open_vault(Database::at_path(&path), 1024).await;
        vault
            .ingest(NewFile::new("big", payload.clone()).with_file_id("big"))
            .await
            .unwrap();
        vault.database().close().await;
    }

    // Same key is loaded from the config store, so old chunks still decrypt
    let vault = open_vault(Database::at_path(&path), 1024).await;
    assert_eq!(vault.read_file("big").await.unwrap(), payload);
    assert_eq!(vault.list_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_ingest_of_distinct_files() {
    let dir = TempDir::new().unwrap();
    let vault = Arc::new(open_vault(Database::at_path(dir.path().join("c.db")), 64).await);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let vault = Arc::clone(&vault);
            tokio::spawn(async move {
                let data = format!("file-{}-", i).repeat(50);
                vault
                    .ingest(NewFile::new(format!("{}.txt", i), data).with_file_id(format!("f{}", i)))
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    for i in 0..8 {
        let data = vault.read_file(&format!("f{}", i)).await.unwrap();
        assert_eq!(data, format!("file-{}-", i).repeat(50).into_bytes());
    }
    assert!(vault.verify_file("f3").await.unwrap().is_healthy());
}

#[tokio::test]
async fn test_orphans_from_interrupted_ingest_are_collected() {
    let db = Database::in_memory();
    let vault = open_vault(db.clone(), 3).await;

    // Chunks persisted, metadata never committed
    for (index, piece) in [&b"XXX"[..], &b"YYY"[..]].iter().enumerate() {
        let chunk = FileChunk::new(
            generate_hash(piece),
            "interrupted".to_string(),
            index as u32,
            Bytes::copy_from_slice(piece),
        );
        db.save_chunk(&chunk).await.unwrap();
    }
    assert!(db.get_metadata("interrupted").await.unwrap().is_none());

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let stats = vault.collect_garbage(std::time::Duration::ZERO).await.unwrap();
    assert_eq!(stats.refs_removed, 2);
    assert_eq!(stats.chunks_removed, 2);
    assert!(db.get_chunks_for_file("interrupted").await.unwrap().is_empty());
}
