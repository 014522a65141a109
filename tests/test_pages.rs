//! Integration tests for the page tree.
//!
//! Covers:
//! - 1-based access and bounds
//! - Insertion at arbitrary positions
//! - Deletion of pages and of whole subtrees
//! - `/Count` consistency after a save and reload

use pdf_seal::{Document, Error, Object, ObjectRef, Page, PageTreeNode, ParserOptions};
use proptest::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Document with `n` pages whose media box width encodes their position.
fn numbered(n: usize) -> Document {
    let mut doc = Document::new();
    for i in 1..=n {
        doc.append_page(Page::new().with_media_box([0.0, 0.0, i as f64, 100.0]))
            .unwrap();
    }
    doc
}

/// Media box width of each page, in document order.
fn widths(doc: &Document) -> Vec<i64> {
    doc.pages()
        .into_iter()
        .map(|page| {
            let media_box = doc.get_object(page).unwrap().get("MediaBox").unwrap();
            let width = &media_box.as_array().unwrap()[2];
            doc.cast::<f64>(width).unwrap() as i64
        })
        .collect()
}

fn reload(doc: &mut Document) -> Document {
    let bytes = doc.to_bytes().unwrap();
    Document::from_bytes(bytes, &ParserOptions::strict()).unwrap()
}

fn root_count(doc: &Document) -> i64 {
    let pages = doc.catalog().unwrap().get("Pages").cloned().unwrap();
    let root = doc.resolve(&pages);
    root.get("Count").and_then(Object::as_integer).unwrap()
}

mod access_tests {
    use super::*;

    #[test]
    fn test_pages_are_one_based() {
        init_logging();
        let doc = numbered(3);
        assert_eq!(doc.page_count(), 3);
        assert_eq!(widths(&doc), vec![1, 2, 3]);

        let first = doc.get_page(1).unwrap();
        assert_eq!(doc.pages()[0], first);
    }

    #[test]
    fn test_parent_is_root_after_round_trip() {
        let mut doc = numbered(3);
        let reloaded = reload(&mut doc);
        let root = reloaded.catalog().unwrap().get("Pages").cloned().unwrap();
        for page in reloaded.pages() {
            assert_eq!(reloaded.get_object(page).unwrap().get("Parent"), Some(&root));
        }
        assert_eq!(root_count(&reloaded), 3);
    }

    #[test]
    fn test_out_of_range_reports_count() {
        let doc = numbered(2);
        match doc.get_page(3) {
            Err(Error::IndexOutOfRange { index, count }) => {
                assert_eq!(index, 3);
                assert_eq!(count, 2);
            },
            other => panic!("expected IndexOutOfRange, got {:?}", other),
        }
        assert!(matches!(doc.get_page(0), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_each_page_restarts() {
        let doc = numbered(4);
        let first: Vec<ObjectRef> = doc.each_page().collect();
        let second: Vec<ObjectRef> = doc.each_page().collect();
        assert_eq!(first, second);
        assert_eq!(doc.each_page().take(2).count(), 2);
    }

    #[test]
    fn test_empty_document_has_no_pages() {
        let doc = Document::new();
        assert_eq!(doc.page_count(), 0);
        assert!(doc.pages().is_empty());
        assert_eq!(doc.each_page().count(), 0);
    }
}

mod insertion_tests {
    use super::*;

    #[test]
    fn test_insert_at_front_middle_and_end() {
        let mut doc = numbered(2);
        doc.insert_page(1, Page::new().with_media_box([0.0, 0.0, 10.0, 100.0]))
            .unwrap();
        doc.insert_page(3, Page::new().with_media_box([0.0, 0.0, 20.0, 100.0]))
            .unwrap();
        doc.insert_page(5, Page::new().with_media_box([0.0, 0.0, 30.0, 100.0]))
            .unwrap();
        assert_eq!(widths(&doc), vec![10, 1, 20, 2, 30]);
        assert_eq!(root_count(&doc), 5);
    }

    #[test]
    fn test_sequential_inserts_keep_order() {
        let mut doc = Document::new();
        for i in 1..=10 {
            doc.insert_page(i, Page::new().with_media_box([0.0, 0.0, i as f64, 100.0]))
                .unwrap();
        }
        assert_eq!(widths(&doc), (1..=10).collect::<Vec<i64>>());

        let front = doc.insert_page(1, Page::new()).unwrap();
        assert_eq!(doc.get_page(1).unwrap(), front);
    }

    #[test]
    fn test_insert_past_end_fails() {
        let mut doc = numbered(2);
        assert!(matches!(
            doc.insert_page(4, Page::new()),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            doc.insert_page(0, Page::new()),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn test_append_node_adds_all_leaves() {
        let mut doc = numbered(1);
        let node = PageTreeNode::new()
            .with_kid(Page::new().with_media_box([0.0, 0.0, 2.0, 100.0]))
            .with_kid(Page::new().with_media_box([0.0, 0.0, 3.0, 100.0]));
        doc.append_page(node).unwrap();

        assert_eq!(doc.page_count(), 3);
        assert_eq!(widths(&doc), vec![1, 2, 3]);
        assert_eq!(widths(&reload(&mut doc)), vec![1, 2, 3]);
    }
}

mod deletion_tests {
    use super::*;

    #[test]
    fn test_delete_page_at_is_one_based() {
        let mut doc = numbered(3);
        doc.delete_page_at(2).unwrap();
        assert_eq!(widths(&doc), vec![1, 3]);
        assert!(matches!(doc.delete_page_at(0), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(doc.delete_page_at(3), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_delete_pages_at_positions() {
        let mut doc = numbered(5);
        doc.delete_pages_at(&[0, 2, 4]).unwrap();
        assert_eq!(widths(&doc), vec![2, 4]);
        assert_eq!(root_count(&reload(&mut doc)), 2);
    }

    #[test]
    fn test_delete_subtree_updates_count() {
        let mut doc = numbered(6);
        let node = PageTreeNode::new().with_kid(Page::new()).with_kid(Page::new());
        doc.append_page(node).unwrap();
        assert_eq!(doc.page_count(), 8);

        doc.delete_pages_at(&[0, 6]).unwrap();
        let reloaded = reload(&mut doc);
        assert_eq!(reloaded.page_count(), 5);
        assert_eq!(root_count(&reloaded), 5);
    }

    #[test]
    fn test_delete_from_parsed_file() {
        let data = include_bytes!("fixtures/3_pages.pdf");
        let mut doc = Document::from_bytes(data.to_vec(), &ParserOptions::strict()).unwrap();
        assert_eq!(doc.page_count(), 3);

        doc.delete_page_at(1).unwrap();
        doc.delete_page_at(1).unwrap();
        let reloaded = reload(&mut doc);
        assert_eq!(reloaded.page_count(), 1);
        assert_eq!(root_count(&reloaded), 1);
    }
}

proptest! {
    #[test]
    fn prop_count_tracks_appends_and_deletes(total in 1usize..12, deletes in 0usize..12) {
        let mut doc = numbered(total);
        let deletes = deletes.min(total);
        for _ in 0..deletes {
            doc.delete_page_at(1).unwrap();
        }
        prop_assert_eq!(doc.page_count(), total - deletes);
        prop_assert_eq!(root_count(&doc), (total - deletes) as i64);
        prop_assert_eq!(doc.pages().len(), total - deletes);
    }
}
