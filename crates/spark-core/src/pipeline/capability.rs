use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Handler 声明支持的事件集合。
///
/// 位图在 Handler 加入 Pipeline 时读取一次并缓存在上下文节点中，
/// 分发路径只做位运算，不做运行期类型探测。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const ACTIVE: Self = Self(1);
    pub const INACTIVE: Self = Self(1 << 1);
    pub const READ: Self = Self(1 << 2);
    pub const WRITE: Self = Self(1 << 3);
    pub const ERROR: Self = Self(1 << 4);

    /// 全部入站事件。
    pub const INBOUND: Self = Self(Self::ACTIVE.0 | Self::INACTIVE.0 | Self::READ.0 | Self::ERROR.0);
    /// 全部事件。
    pub const ALL: Self = Self(Self::INBOUND.0 | Self::WRITE.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `other` 中的每一位都在 `self` 中；`other` 为空时恒为假。
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Capabilities, &str); 5] = [
            (Capabilities::ACTIVE, "active"),
            (Capabilities::INACTIVE, "inactive"),
            (Capabilities::READ, "read"),
            (Capabilities::WRITE, "write"),
            (Capabilities::ERROR, "error"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}
