use core::fmt;

/// 文件系统操作的失败原因。
/// 操作失败不外泄任何半成品状态；是否重试由上层决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 空路径或畸形路径
    PathInvalid,
    /// 路径的中间目录缺失，或中间段不是目录
    PathNotFound,
    /// 父目录中已有同名项
    AlreadyExists,
    /// 位图中找不到空闲扇区
    NoFreeSector,
    /// 父目录没有空闲目录项
    DirectoryFull,
    /// 末段名字不存在
    NoSuchEntry,
    /// 打开文件表已满
    OpenTableFull,
    /// 非递归删除非空目录
    DirectoryNotEmpty,
}

pub type FsResult<T> = Result<T, FsError>;

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::PathInvalid => "invalid path",
            Self::PathNotFound => "path not found",
            Self::AlreadyExists => "already exists",
            Self::NoFreeSector => "no free sector",
            Self::DirectoryFull => "directory full",
            Self::NoSuchEntry => "no such entry",
            Self::OpenTableFull => "open file table full",
            Self::DirectoryNotEmpty => "directory not empty",
        };
        f.write_str(message)
    }
}
