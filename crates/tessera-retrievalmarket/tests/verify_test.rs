use tessera_retrievalmarket::{BlockVerifier, RetrievalError, SelectorVerifier};
use tessera_testutil::TestIpldTree;
use tessera_types::Block;

/// Feed `blocks` into a fresh verifier. The last block is expected to
/// either complete the traversal or be rejected, depending on
/// `error_on_last`; every earlier block must be accepted without
/// finishing.
async fn check_verify_sequence(error_on_last: bool, blocks: Vec<Block>) {
    let tree = TestIpldTree::new();
    let mut verifier = SelectorVerifier::new(tree.root);

    let last = blocks.len() - 1;
    for (i, block) in blocks.iter().enumerate() {
        let result = verifier.verify(block).await;
        if i < last {
            assert!(!result.unwrap(), "unexpectedly done at block {}", i);
        } else if error_on_last {
            assert!(matches!(
                result,
                Err(RetrievalError::VerificationFailed)
            ));
        } else {
            assert!(result.unwrap(), "expected completion on final block");
        }
    }
}

#[tokio::test]
async fn test_verifies_full_walk_order() {
    let tree = TestIpldTree::new();
    check_verify_sequence(false, tree.blocks_in_order()).await;
}

#[tokio::test]
async fn test_rejects_wrong_block_right_away() {
    let tree = TestIpldTree::new();
    check_verify_sequence(true, vec![tree.leaf_alpha_block.clone()]).await;
}

#[tokio::test]
async fn test_rejects_wrong_block_in_middle() {
    let tree = TestIpldTree::new();
    check_verify_sequence(
        true,
        vec![
            tree.root_block.clone(),
            tree.leaf_alpha_block.clone(),
            tree.middle_map_block.clone(),
            // expected leaf alpha here
            tree.middle_list_block.clone(),
        ],
    )
    .await;
}

#[tokio::test]
async fn test_rejects_wrong_block_at_end() {
    let tree = TestIpldTree::new();
    check_verify_sequence(
        true,
        vec![
            tree.root_block.clone(),
            tree.leaf_alpha_block.clone(),
            tree.middle_map_block.clone(),
            tree.leaf_alpha_block.clone(),
            tree.middle_list_block.clone(),
            tree.leaf_alpha_block.clone(),
            tree.leaf_alpha_block.clone(),
            tree.leaf_beta_block.clone(),
            // expected leaf alpha as the final block
            tree.leaf_beta_block.clone(),
        ],
    )
    .await;
}

#[tokio::test]
async fn test_no_verification_possible_after_rejection() {
    let tree = TestIpldTree::new();
    let mut verifier = SelectorVerifier::new(tree.root);

    assert!(matches!(
        verifier.verify(&tree.leaf_beta_block).await,
        Err(RetrievalError::VerificationFailed)
    ));
    // the verifier is done; even the correct block is now rejected
    assert!(matches!(
        verifier.verify(&tree.root_block).await,
        Err(RetrievalError::VerificationFailed)
    ));
}

#[tokio::test]
async fn test_no_verification_possible_after_completion() {
    let tree = TestIpldTree::new();
    let mut verifier = SelectorVerifier::new(tree.root);

    for block in tree.blocks_in_order() {
        let _ = verifier.verify(&block).await.unwrap();
    }
    assert!(matches!(
        verifier.verify(&tree.root_block).await,
        Err(RetrievalError::VerificationFailed)
    ));
}

#[tokio::test]
async fn test_optimistic_verifier_accepts_anything() {
    let tree = TestIpldTree::new();
    let mut verifier = tessera_retrievalmarket::OptimisticVerifier;
    assert!(!verifier.verify(&tree.leaf_beta_block).await.unwrap());
    assert!(!verifier.verify(&tree.leaf_beta_block).await.unwrap());
}
