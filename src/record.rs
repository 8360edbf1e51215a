/// This is the structure of an allocation record. One record exists for
/// every block currently handed out by the collector; its identity is the
/// block's address.
///
/// Records live directly inside the registry's bucket array. The first
/// record hashed to a bucket is stored inline in the slot itself and every
/// later collision is chained behind it through the `next` link:
///
/// ```text
///  bucket array
/// +--------------+
/// |    Empty     |
/// +--------------+      +--------------+      +--------------+
/// |    Record    | ---> |    Record    | ---> |    Record    |
/// +--------------+      +--------------+      +--------------+
/// |    Record    |         (chained)             (chained)
/// +--------------+
/// |    Empty     |
/// +--------------+
/// ```
///
/// See the registry module for how the slots are managed.
pub struct Record {
    /// Address of the tracked block.
    pub addr: usize,
    /// Size of the tracked block in bytes.
    pub size: usize,
    /// Mark flag: set while the last mark phase found the block reachable,
    /// cleared again by the sweep that follows.
    pub in_use: bool,
    /// Next record sharing this bucket, if any.
    pub(crate) next: Option<Box<Record>>,
}

impl Record {
    /// Creates a new unmarked, unchained record for a freshly allocated
    /// block.
    pub(crate) fn new(addr: usize, size: usize) -> Self {
        Self {
            addr,
            size,
            in_use: false,
            next: None,
        }
    }
}
