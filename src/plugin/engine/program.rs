//! 链接后的可执行程序与重载集合

use std::collections::HashMap;

use super::ast::{Block, Expr, Span};
use crate::plugin::value::{Signature, Value, ValueType};

/// `Program::functions` 中的下标
pub type FnId = usize;

/// 函数体中的调用按哪张符号表解析
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// 脚本自身：可见脚本函数、依赖库函数与模块变量
    Module,
    /// 依赖库：只可见依赖库函数
    Library,
}

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub params: Vec<(String, ValueType)>,
    pub signature: Signature,
    pub body: Block,
    pub linkage: Linkage,
    /// 定义所在文件（用于日志和诊断）
    pub origin: String,
    pub span: Span,
}

/// 同名函数的全部重载，按声明顺序
#[derive(Debug, Clone, Default)]
pub struct OverloadSet {
    entries: Vec<(Signature, FnId)>,
    by_signature: HashMap<Signature, FnId>,
}

/// 重载选择结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 只有一个候选，直接调用（参数是否匹配由调用本身检查）
    Only(FnId),
    /// 多个候选中签名完全相等的那个
    Exact(FnId),
    /// 多个候选均不匹配
    NoMatch,
}

impl OverloadSet {
    /// 已存在相同签名时返回 false，且不覆盖
    pub fn insert(&mut self, signature: Signature, id: FnId) -> bool {
        if self.by_signature.contains_key(&signature) {
            return false;
        }
        self.by_signature.insert(signature.clone(), id);
        self.entries.push((signature, id));
        true
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.by_signature.contains_key(signature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_arity(&self, arity: usize) -> bool {
        self.entries.iter().any(|(sig, _)| sig.arity() == arity)
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.entries.iter().map(|(sig, _)| sig)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Signature, FnId)> {
        self.entries.iter().map(|(sig, id)| (sig, *id))
    }

    /// 按实参选择重载：单个候选直接返回，多个候选要求签名完全相等
    pub fn select(&self, args: &[Value]) -> Selection {
        match self.entries.as_slice() {
            [] => Selection::NoMatch,
            [(_, id)] => Selection::Only(*id),
            _ => match self.by_signature.get(&Signature::of(args)) {
                Some(id) => Selection::Exact(*id),
                None => Selection::NoMatch,
            },
        }
    }
}

/// 编译并链接完成的脚本
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub script: String,
    /// 脚本函数在前（声明顺序），依赖库函数在后
    pub functions: Vec<CompiledFunction>,
    pub globals: Vec<(String, Expr)>,
    /// 脚本函数 + 未被遮蔽的依赖库函数
    pub module_symbols: HashMap<String, OverloadSet>,
    /// 仅依赖库函数
    pub library_symbols: HashMap<String, OverloadSet>,
    pub capabilities: Capabilities,
}

/// 脚本对外暴露的能力，链接时一次性构建
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// 激活钩子，声明顺序
    pub activation_hooks: Vec<FnId>,
    /// 停用钩子，声明顺序
    pub deactivation_hooks: Vec<FnId>,
    /// 可调用函数（仅脚本自身定义的，含钩子）
    pub callables: HashMap<String, OverloadSet>,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        self.activation_hooks.is_empty()
            && self.deactivation_hooks.is_empty()
            && self.callables.is_empty()
    }
}

impl Program {
    pub fn symbols(&self, linkage: Linkage) -> &HashMap<String, OverloadSet> {
        match linkage {
            Linkage::Module => &self.module_symbols,
            Linkage::Library => &self.library_symbols,
        }
    }

    pub fn function(&self, id: FnId) -> &CompiledFunction {
        &self.functions[id]
    }
}
