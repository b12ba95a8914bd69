//! Resolver behaviour against an instrumented driver: symlink expansion at
//! leaf and component positions, probe ordering, and the depth cap.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use linden_abi::{OpenFlags, MAX_SYMLINK_LEVEL};
use vfs_core::{
    FileSystem, GuestFile, GuestPath, MountTable, OpenOutcome, Resolver, VfsError, VfsResult,
};

#[derive(Clone)]
enum Node {
    File,
    Dir,
    Symlink(Vec<u8>),
}

#[derive(Default)]
struct Counters {
    opens: usize,
    readlinks: Vec<Vec<u8>>,
    mkdirs: Vec<Vec<u8>>,
}

struct ScriptedFs {
    nodes: HashMap<Vec<u8>, Node>,
    counters: Mutex<Counters>,
    symlinks_supported: bool,
}

impl ScriptedFs {
    fn new(entries: &[(&[u8], Node)]) -> Arc<Self> {
        let mut nodes = HashMap::new();
        nodes.insert(b".".to_vec(), Node::Dir);
        for (path, node) in entries {
            nodes.insert(path.to_vec(), node.clone());
        }
        Arc::new(Self {
            nodes,
            counters: Mutex::new(Counters::default()),
            symlinks_supported: true,
        })
    }

    fn without_symlink_support(entries: &[(&[u8], Node)]) -> Arc<Self> {
        let mut fs = Self::new(entries);
        Arc::get_mut(&mut fs).unwrap().symlinks_supported = false;
        fs
    }

    fn opens(&self) -> usize {
        self.counters.lock().opens
    }

    fn readlinks(&self) -> Vec<Vec<u8>> {
        self.counters.lock().readlinks.clone()
    }
}

struct ScriptedFile;

impl GuestFile for ScriptedFile {
    fn flags(&self) -> OpenFlags {
        OpenFlags::empty()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl FileSystem for ScriptedFs {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, subpath: &[u8], _flags: OpenFlags, _mode: u32) -> VfsResult<OpenOutcome> {
        self.counters.lock().opens += 1;
        match self.nodes.get(subpath) {
            Some(Node::File) | Some(Node::Dir) => Ok(OpenOutcome::File(Arc::new(ScriptedFile))),
            Some(Node::Symlink(target)) => Ok(OpenOutcome::Symlink(target.clone())),
            None => Err(VfsError::NotFound),
        }
    }

    fn readlink(&self, subpath: &[u8]) -> VfsResult<Vec<u8>> {
        if !self.symlinks_supported {
            return Err(VfsError::NotSupported);
        }
        self.counters.lock().readlinks.push(subpath.to_vec());
        match self.nodes.get(subpath) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(VfsError::InvalidInput),
            None => Err(VfsError::NotFound),
        }
    }

    fn mkdir(&self, subpath: &[u8], _mode: u32) -> VfsResult<()> {
        match self.nodes.get(subpath) {
            Some(_) => Err(VfsError::AlreadyExists),
            None => {
                let parent = match subpath.iter().rposition(|&b| b == b'/') {
                    Some(i) => &subpath[..i],
                    None => &b"."[..],
                };
                if !matches!(self.nodes.get(parent), Some(Node::Dir)) {
                    return Err(VfsError::NotFound);
                }
                self.counters.lock().mkdirs.push(subpath.to_vec());
                Ok(())
            }
        }
    }
}

fn mounted(fs: Arc<ScriptedFs>) -> MountTable {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let table = MountTable::new();
    table.add(vfs_core::GuestPathBuf::root(), fs);
    table
}

fn root() -> &'static GuestPath {
    GuestPath::new(b"/")
}

#[test]
fn component_symlink_is_probed_once() {
    let fs = ScriptedFs::new(&[
        (b"real", Node::Dir),
        (b"real/file", Node::File),
        (b"link", Node::Symlink(b"/real".to_vec())),
    ]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    resolver
        .open(root(), b"/link/file", OpenFlags::empty(), 0)
        .expect("open through component symlink");
    assert_eq!(fs.readlinks(), vec![b"link".to_vec()]);
    assert_eq!(fs.opens(), 2);
}

#[test]
fn self_referential_leaf_yields_eloop_at_the_cap() {
    let fs = ScriptedFs::new(&[(b"a", Node::Symlink(b"/a".to_vec()))]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    let err = resolver
        .open(root(), b"/a", OpenFlags::empty(), 0)
        .unwrap_err();
    assert_eq!(err, VfsError::TooManySymlinks);
    assert_eq!(fs.opens(), MAX_SYMLINK_LEVEL);
}

#[test]
fn self_referential_component_yields_eloop() {
    let fs = ScriptedFs::new(&[(b"p", Node::Symlink(b"/p".to_vec()))]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    let err = resolver
        .open(root(), b"/p/x", OpenFlags::empty(), 0)
        .unwrap_err();
    assert_eq!(err, VfsError::TooManySymlinks);
}

#[test]
fn leaf_chain_opens_k_plus_one_times() {
    let fs = ScriptedFs::new(&[
        (b"s1", Node::Symlink(b"/s2".to_vec())),
        (b"s2", Node::Symlink(b"/s3".to_vec())),
        (b"s3", Node::Symlink(b"/f".to_vec())),
        (b"f", Node::File),
    ]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    resolver
        .open(root(), b"/s1", OpenFlags::empty(), 0)
        .expect("chain within the cap resolves");
    assert_eq!(fs.opens(), 4);
    assert!(fs.readlinks().is_empty(), "leaf expansion needs no probe");
}

#[test]
fn probe_scans_right_to_left() {
    // /a is a real dir, /a/l a symlink to /real; opening /a/l/x must probe
    // "a/l" before "a".
    let fs = ScriptedFs::new(&[
        (b"a", Node::Dir),
        (b"a/l", Node::Symlink(b"/real".to_vec())),
        (b"real", Node::Dir),
        (b"real/x", Node::File),
    ]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    resolver
        .open(root(), b"/a/l/x", OpenFlags::empty(), 0)
        .expect("nested component symlink resolves");
    assert_eq!(fs.readlinks(), vec![b"a/l".to_vec()]);
}

#[test]
fn missing_leaf_without_symlinks_is_plain_enoent() {
    let fs = ScriptedFs::new(&[(b"d", Node::Dir)]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    let err = resolver
        .open(root(), b"/d/missing", OpenFlags::empty(), 0)
        .unwrap_err();
    assert_eq!(err, VfsError::NotFound);
    // the probe ran but found nothing
    assert_eq!(fs.readlinks(), vec![b"d".to_vec()]);
}

#[test]
fn driver_without_readlink_converts_to_enoent() {
    let fs = ScriptedFs::without_symlink_support(&[(b"d", Node::Dir)]);
    let mounts = mounted(fs);
    let resolver = Resolver::new(&mounts);

    let err = resolver
        .open(root(), b"/d/missing", OpenFlags::empty(), 0)
        .unwrap_err();
    assert_eq!(err, VfsError::NotFound);
}

#[test]
fn mkdir_resolves_component_symlinks_too() {
    let fs = ScriptedFs::new(&[
        (b"real", Node::Dir),
        (b"link", Node::Symlink(b"/real".to_vec())),
    ]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    resolver.mkdir(root(), b"/link/sub", 0o755).unwrap();
    assert_eq!(fs.counters.lock().mkdirs, vec![b"real/sub".to_vec()]);
}

#[test]
fn relative_paths_resolve_against_cwd() {
    let fs = ScriptedFs::new(&[(b"home", Node::Dir), (b"home/f", Node::File)]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    resolver
        .open(GuestPath::new(b"/home"), b"f", OpenFlags::empty(), 0)
        .expect("cwd-relative open");
    assert_eq!(fs.opens(), 1);
}

#[test]
fn errors_other_than_enoent_propagate_unprobed() {
    let fs = ScriptedFs::new(&[(b"f", Node::File)]);
    let mounts = mounted(fs.clone());
    let resolver = Resolver::new(&mounts);

    // readlink of an existing non-symlink is EINVAL and must not turn into
    // a component scan
    let err = resolver.readlink(root(), b"/f").unwrap_err();
    assert_eq!(err, VfsError::InvalidInput);
    assert_eq!(fs.readlinks(), vec![b"f".to_vec()]);
}
