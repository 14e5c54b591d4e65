//! Collection of lambda call sites from one class

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use super::descriptor;
use super::lambda::{CallSiteRecord, ReferenceKind, ResolvedClass, ResolvedMember};
use crate::classfile::attribute::BootstrapMethod;
use crate::classfile::class::ClassFile;
use crate::classfile::classpool::ClassResolver;
use crate::classfile::constpool::{Constant, ConstantPool};
use crate::common::consts::*;
use crate::common::error::{Error, Result};

/// Builds one [`CallSiteRecord`] per lambda bootstrap method of a class
pub struct CallSiteCollector<'r> {
    resolver: Option<&'r dyn ClassResolver>,
}

impl<'r> CallSiteCollector<'r> {
    /// Without a resolver every record is left unresolved
    pub fn new(resolver: Option<&'r dyn ClassResolver>) -> Self {
        Self { resolver }
    }

    /// Records keyed by bootstrap method index. Call sites bootstrapped by
    /// anything other than `LambdaMetafactory` are skipped.
    pub fn collect(&self, class: &ClassFile) -> Result<BTreeMap<u16, CallSiteRecord>> {
        let pool = &class.constant_pool;
        let owner = class.name()?;
        let mut records = BTreeMap::new();

        for (_, constant) in pool.iter() {
            let Constant::InvokeDynamic(bootstrap_index, nat_index) = constant else {
                continue;
            };
            if records.contains_key(bootstrap_index) {
                continue;
            }
            let bootstrap = class
                .bootstrap_methods()
                .ok_or_else(|| Error::malformed_class(format!("{} has invokedynamic but no BootstrapMethods", owner)))?
                .bootstrap_methods
                .get(*bootstrap_index as usize)
                .ok_or_else(|| {
                    Error::malformed_class(format!("{}: bootstrap method {} is missing", owner, bootstrap_index))
                })?;
            if !is_lambda_bootstrap(pool, bootstrap)? {
                trace!(owner, bootstrap_index, "skipping non-lambda call site");
                continue;
            }
            let (name, factory_descriptor) = pool.name_and_type(*nat_index)?;
            let record = self.build_record(owner, pool, *bootstrap_index, bootstrap, name, factory_descriptor)?;
            debug!(
                owner,
                bootstrap_index,
                target = record.target_method_name.as_deref().unwrap_or("?"),
                resolved = record.resolved_target_member.is_some(),
                "collected lambda call site"
            );
            records.insert(*bootstrap_index, record);
        }
        Ok(records)
    }

    fn build_record(
        &self,
        owner: &str,
        pool: &ConstantPool,
        bootstrap_index: u16,
        bootstrap: &BootstrapMethod,
        name: &str,
        factory_descriptor: &str,
    ) -> Result<CallSiteRecord> {
        let args = &bootstrap.bootstrap_arguments;
        let missing = |what: &str| Error::malformed_class(format!("{}: call site {} lacks {}", owner, bootstrap_index, what));

        let interface = descriptor::return_class_name(factory_descriptor)?
            .ok_or_else(|| missing("a functional interface return type"))?;
        let sam_descriptor = method_type(pool, *args.first().ok_or_else(|| missing("the method type argument"))?)?;
        let (handle_kind, handle_ref) = match pool.get(*args.get(1).ok_or_else(|| missing("the implementation handle"))?) {
            Some(Constant::MethodHandle(kind, reference)) => (*kind, *reference),
            _ => return Err(missing("a method handle as second argument")),
        };
        let target_kind = ReferenceKind::from_handle_kind(handle_kind).ok_or_else(|| missing("a method implementation"))?;
        args.get(2).ok_or_else(|| missing("the instantiated method type"))?;
        let target = pool.member_ref(handle_ref)?;

        let mut interfaces = vec![interface.to_string()];
        let mut bridges = Vec::new();
        if let Some(&flags_index) = args.get(3) {
            let flags = integer(pool, flags_index)?;
            let mut rest = args[4..].iter().copied();
            if flags & FLAG_MARKERS != 0 {
                let count = integer(pool, rest.next().ok_or_else(|| missing("the marker count"))?)?;
                for _ in 0..count {
                    let index = rest.next().ok_or_else(|| missing("a marker interface"))?;
                    interfaces.push(pool.class_name(index)?.to_string());
                }
            }
            if flags & FLAG_BRIDGES != 0 {
                let count = integer(pool, rest.next().ok_or_else(|| missing("the bridge count"))?)?;
                for _ in 0..count {
                    let index = rest.next().ok_or_else(|| missing("a bridge method type"))?;
                    bridges.push(method_type(pool, index)?.to_string());
                }
            }
            if flags & FLAG_SERIALIZABLE != 0 && !interfaces.iter().any(|i| i == SERIALIZABLE_INTERFACE) {
                interfaces.push(SERIALIZABLE_INTERFACE.to_string());
            }
        }

        let (resolved_target_class, resolved_target_member) = match self.resolver {
            Some(resolver) => resolve_target(resolver, target.class_name, target.name, target.descriptor),
            None => (None, None),
        };

        Ok(CallSiteRecord {
            bootstrap_args: args.clone(),
            factory_descriptor: factory_descriptor.to_string(),
            implemented_interfaces: interfaces,
            bridge_descriptors: bridges,
            functional_method_name: name.to_string(),
            functional_method_descriptor: sam_descriptor.to_string(),
            target_class_name: Some(target.class_name.to_string()),
            target_method_name: Some(target.name.to_string()),
            target_method_descriptor: Some(target.descriptor.to_string()),
            resolved_target_class,
            resolved_target_member,
            ..CallSiteRecord::new(owner, bootstrap_index, target_kind)
        })
    }
}

fn is_lambda_bootstrap(pool: &ConstantPool, bootstrap: &BootstrapMethod) -> Result<bool> {
    let reference = match pool.get(bootstrap.bootstrap_method) {
        Some(Constant::MethodHandle(_, reference)) => *reference,
        _ => return Err(Error::malformed_class("bootstrap method is not a method handle")),
    };
    let member = pool.member_ref(reference)?;
    Ok(member.class_name == LAMBDA_METAFACTORY_CLASS
        && (member.name == LAMBDA_METAFACTORY_METHOD || member.name == LAMBDA_ALT_METAFACTORY_METHOD))
}

fn method_type(pool: &ConstantPool, index: u16) -> Result<&str> {
    match pool.get(index) {
        Some(Constant::MethodType(descriptor_index)) => Ok(pool.utf8(*descriptor_index)?),
        _ => Err(Error::malformed_class(format!("constant {} is not a MethodType", index))),
    }
}

fn integer(pool: &ConstantPool, index: u16) -> Result<i32> {
    match pool.get(index) {
        Some(Constant::Integer(value)) => Ok(*value),
        _ => Err(Error::malformed_class(format!("constant {} is not an Integer", index))),
    }
}

/// Look the target up in the class pools, searching superclasses before
/// superinterfaces. Superinterfaces are visited breadth-first, so a direct
/// superinterface wins over one it extends. Anything missing yields `None`.
fn resolve_target(
    resolver: &dyn ClassResolver,
    class_name: &str,
    name: &str,
    descriptor: &str,
) -> (Option<ResolvedClass>, Option<ResolvedMember>) {
    let Some(class) = resolver.resolve_class(class_name) else {
        trace!(class_name, "target class not in class pools");
        return (None, None);
    };
    let resolved_class = ResolvedClass { name: class_name.to_string(), access_flags: class.access_flags };

    let mut queue = VecDeque::from([class]);
    let mut interfaces = VecDeque::new();
    let mut steps = 0;
    // Superclass chain first, collecting interfaces for a second pass
    while let Some(current) = queue.pop_front() {
        steps += 1;
        if steps > MAX_HIERARCHY_STEPS {
            break;
        }
        if let Some(member) = declared_member(current, name, descriptor) {
            return (Some(resolved_class), Some(member));
        }
        interfaces.extend(current.interface_names().unwrap_or_default());
        if let Ok(Some(super_name)) = current.super_name() {
            if let Some(super_class) = resolver.resolve_class(super_name) {
                queue.push_back(super_class);
            }
        }
    }

    let mut seen = Vec::new();
    while let Some(interface_name) = interfaces.pop_front() {
        steps += 1;
        if steps > MAX_HIERARCHY_STEPS {
            break;
        }
        if seen.contains(&interface_name) {
            continue;
        }
        seen.push(interface_name);
        let Some(interface) = resolver.resolve_class(interface_name) else { continue };
        if let Some(member) = declared_member(interface, name, descriptor) {
            return (Some(resolved_class), Some(member));
        }
        interfaces.extend(interface.interface_names().unwrap_or_default());
    }

    trace!(class_name, name, descriptor, "target member not found");
    (Some(resolved_class), None)
}

fn declared_member(class: &ClassFile, name: &str, descriptor: &str) -> Option<ResolvedMember> {
    let method = class.find_method(name, descriptor)?;
    Some(ResolvedMember {
        declaring_class: class.name().ok()?.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access_flags: method.access_flags,
    })
}
