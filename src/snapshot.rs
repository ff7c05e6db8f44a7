use arc_swap::ArcSwap;
use std::sync::Arc;

/// 单写多读的发布单元
///
/// 写者每个周期构建完整的新表后整体替换，读者拿到的始终是某一次完整发布的结果。
#[derive(Clone)]
pub struct Published<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Published<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// 整体替换当前发布的值
    pub fn publish(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// 读取当前发布的值
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
