//! End-to-end tests for the store/retrieve pipeline
//!
//! These drive the full OFF data flow against the in-memory store: source
//! bytes through ECIES stream encryption, tuple brightening and persistence,
//! CBL assembly, then back out through tuple XOR and stream decryption.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    use crate::block::BlockSize;
    use crate::constants::CHECKSUM_LENGTH;
    use crate::checksum::Checksum;
    use crate::error::{BrightChainError, CblError, EciesError};
    use crate::guid::MemberId;
    use crate::cbl::CblExtension;
    use crate::pipeline::{open_cbl, retrieve_to_vec, store_stream, StoreRequest, StoreResult};
    use crate::store::MemoryBlockStore;
    use crate::whitener::{WhitenerCache, WhitenerProvider};

    fn keypair() -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut rand::thread_rng());
        let pk = PublicKey::from_secret_key(&secp, &sk);
        (sk, pk)
    }

    /// Helper: run the store pipeline over `data` with a fresh cache.
    async fn run_store(
        data: &[u8],
        sk: &SecretKey,
        pk: &PublicKey,
        store: &MemoryBlockStore,
        tuple_size: usize,
    ) -> Result<StoreResult, BrightChainError> {
        let cache = Arc::new(WhitenerCache::new());
        let provider = WhitenerProvider::new(cache);
        let request = StoreRequest {
            creator_id: MemberId::new(),
            signing_key: sk,
            creator_public: pk,
            block_size: BlockSize::Tiny,
            tuple_size,
            extension: None,
            deadline: None,
        };
        store_stream(request, data, data.len() as u64, &provider, &provider, store).await
    }

    #[tokio::test]
    async fn test_store_retrieve_round_trip() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let result = run_store(&data, &sk, &pk, &store, 3).await.unwrap();
        assert_eq!(result.original_length, 1000);
        assert_eq!(result.original_checksum, Checksum::of(&data));
        // 1024-byte blocks carry 927 plaintext bytes each
        assert_eq!(result.tuple_count, 2);
        assert_eq!(result.address_count, 6);
        assert_eq!(result.cbl_block.data().len(), 1024);

        let restored = retrieve_to_vec(&sk, &pk, &result.cbl_block, &store, None)
            .await
            .unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_store_exact_block_multiple() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        // exactly two strides of the Tiny-size plaintext capacity
        let data = vec![0x5Au8; 927 * 2];

        let result = run_store(&data, &sk, &pk, &store, 3).await.unwrap();
        assert_eq!(result.tuple_count, 2);

        let restored = retrieve_to_vec(&sk, &pk, &result.cbl_block, &store, None)
            .await
            .unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_store_empty_source() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();

        let result = run_store(&[], &sk, &pk, &store, 3).await.unwrap();
        // an empty file still yields one (fully padded) tuple
        assert_eq!(result.tuple_count, 1);
        assert_eq!(result.original_length, 0);

        let restored = retrieve_to_vec(&sk, &pk, &result.cbl_block, &store, None)
            .await
            .unwrap();
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_address_list_is_tuple_aligned() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let data = vec![1u8; 900];

        for tuple_size in [2usize, 3, 5] {
            let result = run_store(&data, &sk, &pk, &store, tuple_size).await.unwrap();
            assert_eq!(result.address_count as usize % tuple_size, 0);
            assert_eq!(
                result.address_count as usize,
                result.tuple_count * tuple_size
            );
        }
    }

    #[tokio::test]
    async fn test_all_tuple_blocks_are_persisted() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let data = vec![9u8; 415];

        let result = run_store(&data, &sk, &pk, &store, 3).await.unwrap();
        assert_eq!(result.tuple_count, 1);
        // primary + random + whitener, all distinct for a single tuple
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_addresses_checksum_matches_list() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let data = vec![7u8; 100];

        let result = run_store(&data, &sk, &pk, &store, 3).await.unwrap();
        // retrieve the CBL body and recompute the checksum over its
        // address data
        let body = crate::ecies::decrypt_single(&sk, result.cbl_block.data()).unwrap();
        let header = crate::cbl::CblHeader::parse(&body).unwrap();
        let addresses = header.address_data(&body).unwrap();
        assert_eq!(addresses.len(), result.address_count as usize * CHECKSUM_LENGTH);
        assert_eq!(Checksum::of(addresses), result.addresses_checksum);
    }

    #[tokio::test]
    async fn test_declared_length_mismatch() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let cache = Arc::new(WhitenerCache::new());
        let provider = WhitenerProvider::new(cache);
        let data = vec![1u8; 100];
        let request = StoreRequest {
            creator_id: MemberId::new(),
            signing_key: &sk,
            creator_public: &pk,
            block_size: BlockSize::Message,
            tuple_size: 3,
            extension: None,
            deadline: None,
        };
        let err = store_stream(request, &data[..], 200, &provider, &provider, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, BrightChainError::SourceStream(_)));
    }

    #[tokio::test]
    async fn test_deadline_expiry_surfaces_timeout() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let cache = Arc::new(WhitenerCache::new());
        let provider = WhitenerProvider::new(cache);
        let data = vec![1u8; 2000];
        let request = StoreRequest {
            creator_id: MemberId::new(),
            signing_key: &sk,
            creator_public: &pk,
            block_size: BlockSize::Message,
            tuple_size: 3,
            extension: None,
            deadline: Some(Duration::ZERO),
        };
        let err = store_stream(request, &data[..], 2000, &provider, &provider, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, BrightChainError::OperationTimeout));
    }

    #[tokio::test]
    async fn test_extended_cbl_carries_file_metadata() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let cache = Arc::new(WhitenerCache::new());
        let provider = WhitenerProvider::new(cache);
        // a Message-size extended CBL holds one tuple of addresses
        let data = vec![0x33u8; 300];

        let request = StoreRequest {
            creator_id: MemberId::new(),
            signing_key: &sk,
            creator_public: &pk,
            block_size: BlockSize::Message,
            tuple_size: 3,
            extension: Some(CblExtension {
                file_name: "notes.txt".into(),
                mime_type: "text/plain".into(),
                recipients: Vec::new(),
            }),
            deadline: None,
        };
        let result = store_stream(request, &data[..], 300, &provider, &provider, &store)
            .await
            .unwrap();

        let (header, _) = open_cbl(&sk, &pk, &result.cbl_block).unwrap();
        assert!(header.is_extended());
        assert_eq!(header.file_name().unwrap(), "notes.txt");
        assert_eq!(header.mime_type().unwrap(), "text/plain");

        let restored = retrieve_to_vec(&sk, &pk, &result.cbl_block, &store, None)
            .await
            .unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_retrieve_with_wrong_key_fails() {
        let (sk, pk) = keypair();
        let (other_sk, _) = keypair();
        let store = MemoryBlockStore::new();
        let data = vec![3u8; 500];

        let result = run_store(&data, &sk, &pk, &store, 3).await.unwrap();
        let err = retrieve_to_vec(&other_sk, &pk, &result.cbl_block, &store, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrightChainError::Ecies(EciesError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_foreign_creator() {
        let (sk, pk) = keypair();
        let (_, bob_pk) = keypair();
        let store = MemoryBlockStore::new();
        let data = vec![4u8; 500];

        let result = run_store(&data, &sk, &pk, &store, 3).await.unwrap();
        let err = retrieve_to_vec(&sk, &bob_pk, &result.cbl_block, &store, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrightChainError::Cbl(CblError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_whitener_reuse_across_tuples() {
        let (sk, pk) = keypair();
        let store = MemoryBlockStore::new();
        let cache = Arc::new(WhitenerCache::new());
        // force every whitener draw through the cache
        let provider = WhitenerProvider::new(Arc::clone(&cache)).with_cache_probability(1.0);
        // eight strides of the Small-size plaintext capacity
        let data = vec![8u8; 3999 * 7 + 100];
        let declared = data.len() as u64;

        let request = StoreRequest {
            creator_id: MemberId::new(),
            signing_key: &sk,
            creator_public: &pk,
            block_size: BlockSize::Small,
            tuple_size: 3,
            extension: None,
            deadline: None,
        };
        let result = store_stream(request, &data[..], declared, &provider, &provider, &store)
            .await
            .unwrap();
        assert_eq!(result.tuple_count, 8);

        // with draws forced through the cache, later tuples reuse earlier
        // noise blocks, so fewer than tuple_count × tuple_size distinct
        // blocks hit the store
        assert!(store.len().await < result.tuple_count * 3);
        assert!(cache.stats().await.hits > 0);

        // and the file still reconstructs
        let restored = retrieve_to_vec(&sk, &pk, &result.cbl_block, &store, None)
            .await
            .unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_missing_block_fails_retrieve() {
        let (sk, pk) = keypair();
        let data = vec![2u8; 300];
        let full_store = MemoryBlockStore::new();
        let result = run_store(&data, &sk, &pk, &full_store, 3).await.unwrap();

        // an empty store cannot serve any tuple member
        let empty_store = MemoryBlockStore::new();
        let err = retrieve_to_vec(&sk, &pk, &result.cbl_block, &empty_store, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BrightChainError::Store(_)));
    }
}
