use async_trait::async_trait;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_filestore::{FileStore, FileStoreError};
use tessera_pieceio::{
    next_piece_size, CarCodec, CarIO, PieceFile, PieceIO, PieceIoError, StagingStore,
};
use tessera_store::{put_node, Blockstore, MemBlockstore};
use tessera_types::{Cid, Codec, MultihashCode, Node, Prefix, Selector};

/// Three proto nodes referencing three raw leaves:
/// nd3 -> { second: nd2, bear: c }, nd2 -> { first: nd1, dog: b },
/// nd1 -> { cat: a }.
async fn build_dag(bs: &MemBlockstore) -> Cid {
    let raw = Prefix::new(Codec::Raw, MultihashCode::Blake3);
    let dag = Prefix::new(Codec::DagJson, MultihashCode::Blake3);

    let a = put_node(bs, &Node::Bytes(b"aaaa".to_vec()), raw).await.unwrap();
    let b = put_node(bs, &Node::Bytes(b"bbbb".to_vec()), raw).await.unwrap();
    let c = put_node(bs, &Node::Bytes(b"cccc".to_vec()), raw).await.unwrap();

    let nd1 = put_node(bs, &Node::map(vec![("cat", Node::Link(a))]), dag)
        .await
        .unwrap();
    let nd2 = put_node(
        bs,
        &Node::map(vec![("first", Node::Link(nd1)), ("dog", Node::Link(b))]),
        dag,
    )
    .await
    .unwrap();
    put_node(
        bs,
        &Node::map(vec![("second", Node::Link(nd2)), ("bear", Node::Link(c))]),
        dag,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_there_and_back_again() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    let bs = Arc::new(MemBlockstore::new());
    let root = build_dag(&bs).await;

    let pio = PieceIO::new(Arc::new(store.clone()), bs.clone());
    let (piece_commitment, mut file) = pio
        .generate_piece_commitment(root, &Selector::all())
        .await
        .unwrap();

    assert_ne!(piece_commitment, [0u8; 32]);

    // the file is the archive followed by a contiguous zero run up to the
    // next accepted piece size
    let mut archive = Vec::new();
    CarCodec::new()
        .write_car(bs.clone(), root, &Selector::all(), &mut archive)
        .await
        .unwrap();

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    assert_eq!(contents.len() as u64, next_piece_size(archive.len() as u64));
    assert_eq!(&contents[..archive.len()], &archive[..]);
    assert!(contents[archive.len()..].iter().all(|b| *b == 0));

    // the non-padded prefix decodes back to the original root
    let id = pio
        .read_piece(&mut Cursor::new(&contents[..archive.len()]))
        .unwrap();
    assert_eq!(id, root);

    store.delete(file.path()).unwrap();
}

#[tokio::test]
async fn test_commitment_matches_external_calculation() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    let bs = Arc::new(MemBlockstore::new());
    let root = build_dag(&bs).await;

    let pio = PieceIO::new(Arc::new(store.clone()), bs);
    let (piece_commitment, mut file) = pio
        .generate_piece_commitment(root, &Selector::all())
        .await
        .unwrap();

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).unwrap();
    let size = buf.len() as u64;

    let external =
        tessera_pieceio::generate_piece_commitment(&mut Cursor::new(buf), size).unwrap();
    assert_eq!(piece_commitment, external);

    store.delete(file.path()).unwrap();
}

struct BrokenStagingStore;

impl StagingStore for BrokenStagingStore {
    fn create_temp(&self) -> tessera_filestore::Result<Box<dyn PieceFile>> {
        Err(FileStoreError::Io(io::Error::other("disk full")))
    }

    fn delete(&self, _path: &Path) -> tessera_filestore::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_create_temp_failure_surfaces() {
    let bs = Arc::new(MemBlockstore::new());
    let root = build_dag(&bs).await;

    let pio = PieceIO::new(Arc::new(BrokenStagingStore), bs);
    let result = pio.generate_piece_commitment(root, &Selector::all()).await;
    assert!(result.is_err());
}

struct BrokenCarIO;

#[async_trait]
impl CarIO for BrokenCarIO {
    async fn write_car(
        &self,
        _bs: Arc<dyn Blockstore>,
        _root: Cid,
        _selector: &Selector,
        sink: &mut (dyn Write + Send),
    ) -> tessera_pieceio::Result<()> {
        // partial output before failing mid-stream
        sink.write_all(b"partial")?;
        Err(PieceIoError::InvalidArchive("failed to write car".into()))
    }

    fn read_car_header(
        &self,
        _source: &mut (dyn Read + Send),
    ) -> tessera_pieceio::Result<tessera_pieceio::CarHeader> {
        Err(PieceIoError::InvalidArchive("unreadable".into()))
    }
}

#[tokio::test]
async fn test_write_car_failure_deletes_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    let bs = Arc::new(MemBlockstore::new());
    let root = build_dag(&bs).await;

    let pio = PieceIO::new(Arc::new(store), bs).with_car_io(Arc::new(BrokenCarIO));
    let result = pio.generate_piece_commitment(root, &Selector::all()).await;
    assert!(result.is_err());

    // nothing left behind in the staging directory
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

/// A scripted staging file. Padding writes are the only all-zero buffers
/// the piece pipeline produces, which lets the mock target them.
struct MockFile {
    data: Vec<u8>,
    pos: usize,
    short_write_padding: bool,
    fail_seek: bool,
}

impl Read for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.data[self.pos.min(self.data.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.short_write_padding && !buf.is_empty() && buf.iter().all(|b| *b == 0) {
            let n = buf.len() - 1;
            self.data.extend_from_slice(&buf[..n]);
            return Ok(n);
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MockFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.fail_seek {
            return Err(io::Error::other("seek failed"));
        }
        match pos {
            SeekFrom::Start(offset) => self.pos = offset as usize,
            SeekFrom::End(offset) => self.pos = (self.data.len() as i64 + offset) as usize,
            SeekFrom::Current(offset) => self.pos = (self.pos as i64 + offset) as usize,
        }
        Ok(self.pos as u64)
    }
}

impl PieceFile for MockFile {
    fn path(&self) -> &Path {
        Path::new("mock")
    }

    fn size(&self) -> tessera_filestore::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

struct MockStagingStore {
    short_write_padding: bool,
    fail_seek: bool,
    deleted: Arc<AtomicBool>,
}

impl StagingStore for MockStagingStore {
    fn create_temp(&self) -> tessera_filestore::Result<Box<dyn PieceFile>> {
        Ok(Box::new(MockFile {
            data: Vec::new(),
            pos: 0,
            short_write_padding: self.short_write_padding,
            fail_seek: self.fail_seek,
        }))
    }

    fn delete(&self, _path: &Path) -> tessera_filestore::Result<()> {
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_padding_short_write_is_detected_and_cleaned_up() {
    let bs = Arc::new(MemBlockstore::new());
    let root = build_dag(&bs).await;

    let deleted = Arc::new(AtomicBool::new(false));
    let pio = PieceIO::new(
        Arc::new(MockStagingStore {
            short_write_padding: true,
            fail_seek: false,
            deleted: deleted.clone(),
        }),
        bs,
    );

    let result = pio.generate_piece_commitment(root, &Selector::all()).await;
    assert!(matches!(result, Err(PieceIoError::ShortPadding { .. })));
    assert!(deleted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_seek_failure_is_cleaned_up() {
    let bs = Arc::new(MemBlockstore::new());
    let root = build_dag(&bs).await;

    let deleted = Arc::new(AtomicBool::new(false));
    let pio = PieceIO::new(
        Arc::new(MockStagingStore {
            short_write_padding: false,
            fail_seek: true,
            deleted: deleted.clone(),
        }),
        bs,
    );

    let result = pio.generate_piece_commitment(root, &Selector::all()).await;
    assert!(result.is_err());
    assert!(deleted.load(Ordering::SeqCst));
}
