//! Call resolution: named calls, methods on receivers, constructors, member
//! access, and the run-time dispatch fallback.

use tracing::trace;

use crate::compile::ast::{Expr, ExprKind};
use crate::compile::{CompileError, Pos};
use crate::descriptor::{JvmType, OBJECT};

use super::body::BodyBuilder;
use super::convert::{to_object, RUNTIME};
use super::expr::Place;
use super::ir::*;
use super::members::{capitalize, SINGLETON};
use super::overload::{self, Selection};
use super::types::{Guard, MethodSig};

/// A call argument; lambdas wait for the selected parameter type.
pub(crate) enum Arg<'x> {
    Ready(Value),
    Lambda(&'x Expr),
}

impl Arg<'_> {
    /// Type used for overload scoring; a lambda fits any reference.
    fn ty(&self) -> JvmType {
        match self {
            Arg::Ready(v) => v.ty.clone(),
            Arg::Lambda(_) => JvmType::Null,
        }
    }
}

fn owner_of(ty: &JvmType) -> &str {
    match ty {
        JvmType::Reference(name) => name,
        _ => OBJECT,
    }
}

fn describe(name: &str, args: &[JvmType]) -> String {
    let args: Vec<String> = args.iter().map(|a| a.simple_name()).collect();
    format!("{}({})", name, args.join(", "))
}

impl<'a> BodyBuilder<'a, '_> {
    pub(crate) fn eval_args<'x>(&mut self, args: &'x [Expr]) -> Result<Vec<Arg<'x>>, CompileError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if matches!(arg.kind, ExprKind::Lambda { .. }) {
                out.push(Arg::Lambda(arg));
                continue;
            }
            let v = self.expr(arg, None)?;
            if v.is_void() {
                return Err(self.err(arg.pos, "argument has no value"));
            }
            out.push(Arg::Ready(v));
        }
        Ok(out)
    }

    /// Convert arguments to the selected parameter types.
    pub(crate) fn finish_args(&mut self, args: Vec<Arg<'_>>, params: &[JvmType], pos: Pos) -> Result<Vec<Value>, CompileError> {
        let mut out = Vec::with_capacity(args.len());
        for (arg, param) in args.into_iter().zip(params) {
            let v = match arg {
                Arg::Ready(v) => v,
                Arg::Lambda(e) => self.expr(e, Some(param))?,
            };
            out.push(self.coerce(v, param, pos)?);
        }
        Ok(out)
    }

    fn select(&self, candidates: &[MethodSig], args: &[Arg<'_>], name: &str, pos: Pos) -> Result<Option<MethodSig>, CompileError> {
        let types: Vec<JvmType> = args.iter().map(Arg::ty).collect();
        match overload::select(self.registry(), candidates, &types) {
            Selection::Found(sig) => Ok(Some(sig)),
            Selection::NoMatch => Ok(None),
            Selection::Ambiguous(all) => {
                let shown: Vec<String> = all.iter().map(MethodSig::display).collect();
                Err(self.err(
                    pos,
                    format!("ambiguous call {}: {}", describe(name, &types), shown.join(" / ")),
                ))
            }
        }
    }

    fn invoke_sig(&mut self, sig: &MethodSig, target: Option<Value>, args: Vec<Arg<'_>>, pos: Pos) -> Result<Value, CompileError> {
        let values = self.finish_args(args, &sig.params, pos)?;
        let method = self.reach_method(sig, pos)?;
        if sig.is_static() {
            return Ok(Value::invoke_static(method, values));
        }
        let target = target.ok_or_else(|| {
            self.err(pos, format!("instance method {} called from a static context", sig.display()))
        })?;
        Ok(Value::invoke(self.registry().invoke_kind(sig), method, Some(target), values))
    }

    /// `name(args)` or `target.name(args)`.
    pub fn call(&mut self, target: Option<&Expr>, name: &str, args: &[Expr], pos: Pos) -> Result<Value, CompileError> {
        match target {
            Some(Expr {
                kind: ExprKind::Name(sup),
                ..
            }) if sup == "super" => self.super_call(name, args, pos),
            Some(t) => {
                if let Some(ty) = self.type_target(t) {
                    return self.static_call(&ty, name, args, pos);
                }
                let recv = self.expr(t, None)?;
                let args = self.eval_args(args)?;
                self.method_call(recv, name, args, pos)
            }
            None => self.unqualified_call(name, args, pos),
        }
    }

    fn unqualified_call(&mut self, name: &str, args: &[Expr], pos: Pos) -> Result<Value, CompileError> {
        if let Some(inner) = self.cx.lookup_inner(name).cloned() {
            let mut values = Vec::with_capacity(inner.captures.len() + args.len());
            for captured in &inner.captures {
                let cell = self
                    .cell_of(captured)
                    .ok_or_else(|| self.err(pos, format!("captured variable {} is not in scope", captured)))?;
                values.push(cell);
            }
            let user_params = inner.method.params[inner.captures.len()..].to_vec();
            if user_params.len() != args.len() {
                return Err(self.err(
                    pos,
                    format!("{} takes {} arguments, found {}", name, user_params.len(), args.len()),
                ));
            }
            let args = self.eval_args(args)?;
            values.extend(self.finish_args(args, &user_params, pos)?);
            return Ok(if inner.is_static {
                Value::invoke_static(inner.method, values)
            } else {
                let this = self.this_value(pos)?;
                Value::invoke(InvokeKind::Virtual, inner.method, Some(this), values)
            });
        }
        if let Some(local) = self.cx.lookup(name).cloned() {
            let f = self.read_local(&local);
            return self.apply(f, args, pos);
        }

        let host_methods: Vec<MethodSig> = self
            .registry()
            .find_methods(self.host(), name)
            .into_iter()
            .filter(|m| self.host_this.is_some() || m.is_static())
            .collect();
        if !host_methods.is_empty() {
            let evaluated = self.eval_args(args)?;
            if let Some(sig) = self.select(&host_methods, &evaluated, name, pos)? {
                let this = self.host_this.clone();
                return self.invoke_sig(&sig, this, evaluated, pos);
            }
            if self.host_this.is_some() && evaluated.iter().any(|a| a.ty() == JvmType::object()) {
                let this = self.host_this.clone();
                return self.dynamic_call(this, name, evaluated);
            }
            let types: Vec<JvmType> = evaluated.iter().map(Arg::ty).collect();
            return Err(self.err(pos, format!("no overload of {} matches", describe(name, &types))));
        }

        let statics: Vec<MethodSig> = self
            .imports()
            .static_types
            .iter()
            .flat_map(|t| self.registry().find_methods(t, name))
            .filter(MethodSig::is_static)
            .collect();
        if !statics.is_empty() {
            let evaluated = self.eval_args(args)?;
            let sig = self.select(&statics, &evaluated, name, pos)?.ok_or_else(|| {
                let types: Vec<JvmType> = evaluated.iter().map(Arg::ty).collect();
                self.err(pos, format!("no overload of {} matches", describe(name, &types)))
            })?;
            return self.invoke_sig(&sig, None, evaluated, pos);
        }

        if let Some(ty) = self.imports().resolve_name(self.registry(), name) {
            return self.construct(&JvmType::Reference(ty), args, pos);
        }
        if let Some(f) = self.field_function(name, pos)? {
            return self.apply(f, args, pos);
        }
        Err(self.err(pos, format!("cannot resolve function {}", name)))
    }

    fn field_function(&mut self, name: &str, pos: Pos) -> Result<Option<Value>, CompileError> {
        match self.registry().find_field(self.host(), name) {
            Some(_) => self.name_value(name, pos).map(Some),
            None => Ok(None),
        }
    }

    /// `Type.name(args)`; an `object` type also answers with its instance
    /// methods.
    fn static_call(&mut self, ty: &str, name: &str, args: &[Expr], pos: Pos) -> Result<Value, CompileError> {
        let statics: Vec<MethodSig> = self
            .registry()
            .find_methods(ty, name)
            .into_iter()
            .filter(MethodSig::is_static)
            .collect();
        let evaluated = self.eval_args(args)?;
        if let Some(sig) = self.select(&statics, &evaluated, name, pos)? {
            return self.invoke_sig(&sig, None, evaluated, pos);
        }
        if self.registry().get(ty).map_or(false, |d| d.is_object) {
            let instance = self.singleton(ty, pos)?;
            return self.method_call(instance, name, evaluated, pos);
        }
        let types: Vec<JvmType> = evaluated.iter().map(Arg::ty).collect();
        Err(self.err(
            pos,
            format!("no static method {} on {}", describe(name, &types), ty.replace('/', "::")),
        ))
    }

    /// `recv.name(args)`; falls back to implicit conversions, then to
    /// run-time dispatch when the receiver's type does not decide the call.
    pub(crate) fn method_call(&mut self, recv: Value, name: &str, args: Vec<Arg<'_>>, pos: Pos) -> Result<Value, CompileError> {
        if recv.is_void() {
            return Err(self.err(pos, "expression has no value"));
        }
        if recv.ty == JvmType::Null {
            return Err(self.err(pos, format!("method {} called on null", name)));
        }
        let recv = to_object(recv);
        let owner = owner_of(&recv.ty).to_string();
        if owner == OBJECT && !matches!(name, "equals" | "hashCode" | "toString" | "getClass") {
            return self.dynamic_call(Some(recv), name, args);
        }

        let candidates: Vec<MethodSig> = self
            .registry()
            .find_methods(&owner, name)
            .into_iter()
            .filter(|m| !m.is_static())
            .collect();
        if let Some(sig) = self.select(&candidates, &args, name, pos)? {
            return self.invoke_sig(&sig, Some(recv), args, pos);
        }
        if let Some(converted) = self.implicit_receiver(&recv, name, &args, pos)? {
            let sig = self.select(&self.registry().find_methods(owner_of(&converted.ty), name), &args, name, pos)?;
            if let Some(sig) = sig {
                return self.invoke_sig(&sig, Some(converted), args, pos);
            }
        }
        let arity_matches = candidates.iter().any(|c| c.params.len() == args.len());
        if owner == OBJECT || (arity_matches && args.iter().any(|a| a.ty() == JvmType::object())) {
            return self.dynamic_call(Some(recv), name, args);
        }
        if self.registry().has_partial_members(&owner) {
            trace!(owner = %owner, method = name, "unknown member, dispatching at run time");
            return self.dynamic_call(Some(recv), name, args);
        }
        let types: Vec<JvmType> = args.iter().map(Arg::ty).collect();
        Err(self.err(
            pos,
            format!("no method {} on {}", describe(name, &types), recv.ty),
        ))
    }

    /// Convert `recv` through the first implicit `cast` whose result type
    /// has a matching `name` method.
    fn implicit_receiver(&self, recv: &Value, name: &str, args: &[Arg<'_>], pos: Pos) -> Result<Option<Value>, CompileError> {
        let types: Vec<JvmType> = args.iter().map(Arg::ty).collect();
        for implicit in &self.imports().implicits {
            let casts: Vec<MethodSig> = self
                .registry()
                .find_methods(implicit, "cast")
                .into_iter()
                .filter(|c| c.params.len() == 1 && !c.is_static())
                .collect();
            let mut viable: Vec<(u32, MethodSig)> = casts
                .into_iter()
                .filter_map(|c| overload::arg_distance(self.registry(), &recv.ty, &c.params[0]).map(|d| (d, c)))
                .collect();
            viable.sort_by_key(|(d, _)| *d);
            for (_, cast) in viable {
                let target = owner_of(&cast.ret);
                let methods = self.registry().find_methods(target, name);
                if matches!(overload::select(self.registry(), &methods, &types), Selection::NoMatch) {
                    continue;
                }
                trace!(implicit = %implicit, method = name, via = %cast.display(), "implicit conversion");
                let instance = self.singleton(implicit, pos)?;
                let arg = self.coerce(recv.clone(), &cast.params[0], pos)?;
                return Ok(Some(Value::invoke(
                    self.registry().invoke_kind(&cast),
                    cast.method_ref(),
                    Some(instance),
                    vec![arg],
                )));
            }
        }
        Ok(None)
    }

    /// Call through the run-time dispatch helper.
    pub(crate) fn dynamic_call(&mut self, recv: Option<Value>, name: &str, args: Vec<Arg<'_>>) -> Result<Value, CompileError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let v = match arg {
                Arg::Ready(v) => v,
                Arg::Lambda(e) => self.expr(e, None)?,
            };
            values.push(to_object(v));
        }
        trace!(caller = %self.class, method = name, args = values.len(), "dynamic call");
        Ok(Value::new(
            JvmType::object(),
            ValueKind::Dynamic {
                caller: self.class.clone(),
                target: recv.map(|r| Box::new(to_object(r))),
                name: name.to_string(),
                args: values,
            },
        ))
    }

    /// `super.name(args)` resolves against the parent class and never
    /// dispatches virtually.
    fn super_call(&mut self, name: &str, args: &[Expr], pos: Pos) -> Result<Value, CompileError> {
        if self.class != self.host() {
            return Err(self.err(pos, "`super` calls are not available inside a lambda"));
        }
        let this = self.this_value(pos)?;
        let parent = self
            .registry()
            .get(self.host())
            .and_then(|d| d.parent.clone())
            .unwrap_or_else(|| OBJECT.to_string());
        let candidates: Vec<MethodSig> = self
            .registry()
            .find_methods(&parent, name)
            .into_iter()
            .filter(|m| !m.is_static())
            .collect();
        let evaluated = self.eval_args(args)?;
        let sig = self.select(&candidates, &evaluated, name, pos)?.ok_or_else(|| {
            let types: Vec<JvmType> = evaluated.iter().map(Arg::ty).collect();
            self.err(pos, format!("no method {} on the parent class", describe(name, &types)))
        })?;
        if sig.is_abstract() {
            return Err(self.err(pos, format!("{} is abstract in the parent class", sig.display())));
        }
        let values = self.finish_args(evaluated, &sig.params, pos)?;
        Ok(Value::invoke(InvokeKind::Special, sig.method_ref(), Some(this), values))
    }

    /// The parent constructor call that opens every primary constructor.
    pub(crate) fn super_ctor(&mut self, args: &[Expr], pos: Pos) -> Result<Ins, CompileError> {
        let this = self.this_value(pos)?;
        let parent = self
            .registry()
            .get(self.host())
            .and_then(|d| d.parent.clone())
            .unwrap_or_else(|| OBJECT.to_string());
        let ctors = self.registry().constructors(&parent);
        if ctors.is_empty() && args.is_empty() {
            let init = MethodRef::new(&parent, "<init>", Vec::new(), JvmType::Void);
            return Ok(Ins::Eval(Value::invoke(InvokeKind::Special, init, Some(this), Vec::new())));
        }
        let evaluated = self.eval_args(args)?;
        let sig = self.select(&ctors, &evaluated, "<init>", pos)?.ok_or_else(|| {
            let types: Vec<JvmType> = evaluated.iter().map(Arg::ty).collect();
            self.err(pos, format!("no constructor {} on the parent class", describe("<init>", &types)))
        })?;
        if sig.access.contains(crate::method_info::MethodAccessFlags::PRIVATE) {
            return Err(self.err(pos, format!("{} has a private constructor", parent.replace('/', "::"))));
        }
        let values = self.finish_args(evaluated, &sig.params, pos)?;
        Ok(Ins::Eval(Value::invoke(InvokeKind::Special, sig.method_ref(), Some(this), values)))
    }

    /// `new T(args)` or `T(args)`.
    pub fn construct(&mut self, ty: &JvmType, args: &[Expr], pos: Pos) -> Result<Value, CompileError> {
        let JvmType::Reference(name) = ty else {
            return Err(self.err(pos, format!("cannot instantiate {}", ty)));
        };
        let def = self
            .registry()
            .get(name)
            .ok_or_else(|| self.err(pos, format!("cannot find type {}", name.replace('/', "::"))))?;
        if def.is_interface() || def.is_abstract() {
            return Err(self.err(pos, format!("cannot instantiate abstract type {}", ty)));
        }
        if def.is_object && name != self.host() {
            return Err(self.err(pos, format!("{} is an object; use its name as a value", ty)));
        }
        let ctors = self.registry().constructors(name);
        if ctors.is_empty() && args.is_empty() {
            return Ok(Value::new_object(name, Vec::new(), Vec::new()));
        }
        let evaluated = self.eval_args(args)?;
        let sig = self.select(&ctors, &evaluated, "<init>", pos)?.ok_or_else(|| {
            let types: Vec<JvmType> = evaluated.iter().map(Arg::ty).collect();
            self.err(pos, format!("no constructor {} on {}", describe(&ty.simple_name(), &types), ty))
        })?;
        let values = self.finish_args(evaluated, &sig.params, pos)?;
        Ok(Value::new_object(name, sig.params.clone(), values))
    }

    /// Call a function value: its single abstract method, or `apply` at
    /// run time when the type is unknown.
    pub fn apply(&mut self, f: Value, args: &[Expr], pos: Pos) -> Result<Value, CompileError> {
        let evaluated = self.eval_args(args)?;
        if f.ty == JvmType::object() {
            return self.dynamic_call(Some(f), "apply", evaluated);
        }
        let sam = match &f.ty {
            JvmType::Reference(name) => self.registry().single_abstract_method(name),
            _ => None,
        };
        match sam {
            Some(sam) => self.method_call(f, &sam.name, evaluated, pos),
            None => Err(self.err(pos, format!("a value of type {} cannot be called", f.ty))),
        }
    }

    /// A bare name that denotes a type rather than a value.
    pub(crate) fn type_target(&self, e: &Expr) -> Option<String> {
        let ExprKind::Name(name) = &e.kind else {
            return None;
        };
        if self.cx.lookup(name).is_some() || (!name.contains("::") && self.registry().find_field(self.host(), name).is_some()) {
            return None;
        }
        self.imports().resolve_name(self.registry(), name)
    }

    /// `target.name` as a value.
    pub fn access(&mut self, target: &Expr, name: &str, pos: Pos) -> Result<Value, CompileError> {
        if let Some(ty) = self.type_target(target) {
            if let Some(field) = self.registry().find_field(&ty, name).filter(|f| f.is_static()) {
                return Ok(Value::get_static(self.reach_field(&field, pos)?));
            }
            let instance = self.singleton(&ty, pos).map_err(|_| {
                self.err(pos, format!("no static field {} on {}", name, ty.replace('/', "::")))
            })?;
            return self.member_of(instance, name, pos);
        }
        let recv = self.expr(target, None)?;
        self.member_of(recv, name, pos)
    }

    fn member_of(&mut self, recv: Value, name: &str, pos: Pos) -> Result<Value, CompileError> {
        if recv.is_void() || recv.ty == JvmType::Null {
            return Err(self.err(pos, format!("cannot read {} from {}", name, recv.ty)));
        }
        if let JvmType::Array(_) = &recv.ty {
            if name == "length" {
                return Ok(Value::new(JvmType::Int, ValueKind::ArrayLength(Box::new(recv))));
            }
        }
        let recv = to_object(recv);
        let owner = owner_of(&recv.ty).to_string();
        if owner != OBJECT {
            if let Some(field) = self.registry().find_field(&owner, name) {
                if field.is_static() {
                    return Ok(Value::get_static(self.reach_field(&field, pos)?));
                }
                return Ok(Value::get_field(self.reach_field(&field, pos)?, recv));
            }
            for accessor in [format!("get{}", capitalize(name)), format!("is{}", capitalize(name)), name.to_string()] {
                let getter = self
                    .registry()
                    .find_methods(&owner, &accessor)
                    .into_iter()
                    .find(|m| m.params.is_empty() && !m.is_static() && m.ret != JvmType::Void);
                if let Some(getter) = getter {
                    return self.invoke_sig(&getter, Some(recv), Vec::new(), pos);
                }
            }
            if !self.registry().has_partial_members(&owner) {
                return Err(self.err(pos, format!("no member {} on {}", name, recv.ty)));
            }
        }
        Ok(self.read_place(
            &Place::Dynamic {
                target: recv,
                name: name.to_string(),
            },
            pos,
        )?)
    }

    pub(crate) fn member_place(&mut self, recv: Value, name: &str, pos: Pos) -> Result<Place, CompileError> {
        if !recv.ty.is_reference() || recv.ty == JvmType::Null {
            return Err(self.err(pos, format!("cannot assign {} on {}", name, recv.ty)));
        }
        if let JvmType::Array(_) = &recv.ty {
            return Err(self.err(pos, "array members cannot be assigned"));
        }
        let owner = owner_of(&recv.ty).to_string();
        if owner == OBJECT {
            return Ok(Place::Dynamic {
                target: recv,
                name: name.to_string(),
            });
        }
        if let Some(field) = self.registry().find_field(&owner, name) {
            self.check_final(&field, pos)?;
            if field.is_static() {
                return Ok(Place::Static(self.reach_field(&field, pos)?));
            }
            return Ok(Place::Field {
                field: self.reach_field(&field, pos)?,
                target: recv,
            });
        }
        let set = self
            .registry()
            .find_methods(&owner, &format!("set{}", capitalize(name)))
            .into_iter()
            .find(|m| m.params.len() == 1 && !m.is_static());
        let Some(set) = set else {
            return Err(self.err(pos, format!("no assignable member {} on {}", name, recv.ty)));
        };
        let get = [format!("get{}", capitalize(name)), format!("is{}", capitalize(name))]
            .iter()
            .flat_map(|g| self.registry().find_methods(&owner, g))
            .find(|m| m.params.is_empty() && !m.is_static());
        Ok(Place::Accessor {
            target: recv,
            key: None,
            ty: set.params[0].clone(),
            get,
            set: Some(set),
        })
    }

    /// `target[key]`: arrays, `get`/`set` or `get`/`put` pairs, or run-time
    /// dispatch.
    pub(crate) fn index_place(&mut self, recv: Value, key: Value, pos: Pos) -> Result<Place, CompileError> {
        if key.is_void() {
            return Err(self.err(pos, "index has no value"));
        }
        match &recv.ty {
            JvmType::Array(elem) => {
                let elem = (**elem).clone();
                let index = self.coerce(key, &JvmType::Int, pos)?;
                Ok(Place::Array { array: recv, index, elem })
            }
            JvmType::Reference(owner) if owner != OBJECT => {
                let owner = owner.clone();
                let key_types = [key.ty.clone()];
                let getters: Vec<MethodSig> = self
                    .registry()
                    .find_methods(&owner, "get")
                    .into_iter()
                    .filter(|m| !m.is_static())
                    .collect();
                let get = match overload::select(self.registry(), &getters, &key_types) {
                    Selection::Found(sig) => Some(sig),
                    _ => None,
                };
                let setters: Vec<MethodSig> = ["set", "put"]
                    .iter()
                    .flat_map(|n| self.registry().find_methods(&owner, n))
                    .filter(|m| m.params.len() == 2 && !m.is_static())
                    .filter(|m| overload::arg_distance(self.registry(), &key.ty, &m.params[0]).is_some())
                    .collect();
                let set = setters.into_iter().next();
                let ty = match (&get, &set) {
                    (Some(g), _) => g.ret.clone(),
                    (None, Some(s)) => s.params[1].clone(),
                    (None, None) => {
                        return Err(self.err(pos, format!("{} cannot be indexed", recv.ty)));
                    }
                };
                Ok(Place::Accessor {
                    target: recv,
                    key: Some(key),
                    get,
                    set,
                    ty,
                })
            }
            JvmType::Reference(_) => Ok(Place::DynamicIndex { target: recv, index: key }),
            other => Err(self.err(pos, format!("{} cannot be indexed", other))),
        }
    }

    pub(crate) fn read_place(&mut self, place: &Place, pos: Pos) -> Result<Value, CompileError> {
        Ok(match place {
            Place::Local(local) => self.read_local(local),
            Place::Field { field, target } => Value::get_field(field.clone(), target.clone()),
            Place::Static(field) => Value::get_static(field.clone()),
            Place::Array { array, index, elem } => Value::new(
                elem.clone(),
                ValueKind::ArrayLoad {
                    array: Box::new(array.clone()),
                    index: Box::new(index.clone()),
                },
            ),
            Place::Accessor { target, key, get, .. } => {
                let get = get
                    .clone()
                    .ok_or_else(|| self.err(pos, format!("{} has no getter", target.ty)))?;
                let args = key.iter().cloned().map(Arg::Ready).collect();
                self.invoke_sig(&get, Some(target.clone()), args, pos)?
            }
            Place::Dynamic { target, name } => Value::invoke_static(
                MethodRef::new(
                    RUNTIME,
                    "getField",
                    vec![JvmType::object(), JvmType::string(), JvmType::reference("java/lang/Class")],
                    JvmType::object(),
                ),
                vec![to_object(target.clone()), Value::str(name), self.this_class()],
            ),
            Place::DynamicIndex { target, index } => {
                self.dynamic_call(Some(target.clone()), "get", vec![Arg::Ready(index.clone())])?
            }
        })
    }

    /// Guards declared on the variable or field behind a place.
    fn place_guards(&self, place: &Place) -> Vec<Guard> {
        match place {
            Place::Local(local) => local.guards.clone(),
            Place::Field { field, .. } | Place::Static(field) => self
                .registry()
                .find_field(&field.owner, &field.name)
                .map(|f| f.guards)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Store an already converted value into the place `target` names. A
    /// guarded variable or field has the value checked before the store.
    pub(crate) fn write_place(&mut self, place: &Place, value: Value, target: &Expr) -> Result<Vec<Ins>, CompileError> {
        let pos = target.pos;
        let guards = self.place_guards(place);
        if guards.is_empty() {
            return Ok(vec![self.store_place(place, value, pos)?]);
        }
        let name = match &target.kind {
            ExprKind::Name(name) | ExprKind::Access { name, .. } => name.as_str(),
            _ => "",
        };
        let ty = place.ty();
        let slot = self.temp(&ty);
        let mut out = vec![Ins::Store { slot, value }];
        for guard in guards {
            out.extend(self.guard(guard, Value::local(slot, ty.clone()), name));
        }
        out.push(self.store_place(place, Value::local(slot, ty), pos)?);
        Ok(out)
    }

    fn store_place(&mut self, place: &Place, value: Value, pos: Pos) -> Result<Ins, CompileError> {
        Ok(match place {
            Place::Local(local) => self.write_local(local, value),
            Place::Field { field, target } => Ins::PutField {
                field: field.clone(),
                target: target.clone(),
                value,
            },
            Place::Static(field) => Ins::PutStatic {
                field: field.clone(),
                value,
            },
            Place::Array { array, index, .. } => Ins::ArrayStore {
                array: array.clone(),
                index: index.clone(),
                value,
            },
            Place::Accessor { target, key, set, .. } => {
                let set = set
                    .clone()
                    .ok_or_else(|| self.err(pos, format!("{} has no setter", target.ty)))?;
                let mut args: Vec<Arg<'_>> = key.iter().cloned().map(Arg::Ready).collect();
                args.push(Arg::Ready(value));
                Ins::Eval(self.invoke_sig(&set, Some(target.clone()), args, pos)?)
            }
            Place::Dynamic { target, name } => Ins::Eval(Value::invoke_static(
                MethodRef::new(
                    RUNTIME,
                    "putField",
                    vec![
                        JvmType::object(),
                        JvmType::string(),
                        JvmType::object(),
                        JvmType::reference("java/lang/Class"),
                    ],
                    JvmType::Void,
                ),
                vec![to_object(target.clone()), Value::str(name), to_object(value), self.this_class()],
            )),
            Place::DynamicIndex { target, index } => {
                let args = vec![Arg::Ready(index.clone()), Arg::Ready(value)];
                Ins::Eval(self.dynamic_call(Some(target.clone()), "set", args)?)
            }
        })
    }

    /// The `singletonInstance` of the host when it is an `object`.
    pub(crate) fn host_singleton(&self) -> Option<Value> {
        let host = self.host();
        self.registry().get(host).filter(|d| d.is_object).map(|_| {
            Value::get_static(FieldRef::new(host, SINGLETON, JvmType::reference(host)))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::compile::semantic::{ClassOutput, InvokeKind, Ins, MethodBody, ValueKind};

    fn body<'a>(out: &'a [ClassOutput], class: &str, method: &str) -> &'a MethodBody {
        out.iter()
            .find(|c| c.name == class)
            .and_then(|c| c.method(method))
            .and_then(|m| m.body.as_ref())
            .unwrap()
    }

    fn text(b: &MethodBody) -> String {
        format!("{:?}", b.ins)
    }

    #[test]
    fn closest_overload_wins() {
        let src = "class A\n    f(x:int):int = 1\n    f(x:long):int = 2\n    f(x:Object):int = 3\n    g():int = f(5)\n";
        let out = analyze(src).unwrap();
        let ret = body(&out, "A", "g").ins.iter().find_map(|i| match i {
            Ins::Return(Some(v)) => Some(v.clone()),
            _ => None,
        });
        let ValueKind::Invoke { method, .. } = ret.unwrap().kind else {
            panic!("expected a call");
        };
        assert_eq!(method.descriptor(), "(I)I");
    }

    #[test]
    fn equal_scores_are_ambiguous() {
        let src = "class A\n    f(x:long, y:int):int = 1\n    f(x:int, y:long):int = 2\n    g():int = f(1, 2)\n";
        let err = analyze(src).unwrap_err();
        assert!(err.message().contains("ambiguous call"), "{}", err.message());
    }

    #[test]
    fn untyped_receivers_dispatch_at_run_time() {
        let out = analyze("class A\n    m(x) = x.frobnicate(1, \"two\")\n").unwrap();
        let t = text(body(&out, "A", "m"));
        assert!(t.contains("Dynamic {"), "{}", t);
        assert!(t.contains("\"frobnicate\""));
    }

    #[test]
    fn unlisted_jdk_members_dispatch_at_run_time() {
        let src = "class A\n    m():Object\n        sb = StringBuilder()\n        sb.append(\"ab\")\n        return sb.reverse()\n";
        let out = analyze(src).unwrap();
        let t = text(body(&out, "A", "m"));
        assert!(t.contains("\"append\""));
        assert!(t.contains("Dynamic {"), "{}", t);
        assert!(t.contains("\"reverse\""));
    }

    #[test]
    fn source_types_still_reject_unknown_members() {
        let err = analyze("class B\nclass A\n    m(b:B):Object = b.nothing()\n").unwrap_err();
        assert!(err.message().contains("no method nothing"), "{}", err.message());
    }

    #[test]
    fn property_sugar_uses_getters_and_setters() {
        let src = "class P\n    var n:int = 0\n    getSize():int = n\n    setSize(v:int):Unit\n        n = v\n\
                   class Q\n    m(p:P):int\n        p.size = 3\n        return p.size\n";
        let out = analyze(src).unwrap();
        let t = text(body(&out, "Q", "m"));
        assert!(t.contains("\"setSize\""));
        assert!(t.contains("\"getSize\""));
    }

    #[test]
    fn interface_receivers_use_invokeinterface() {
        let out = analyze("class A\n    m(xs:java::util::List):int = xs.size()\n").unwrap();
        let ret = body(&out, "A", "m").ins.iter().find_map(|i| match i {
            Ins::Return(Some(v)) => Some(v.clone()),
            _ => None,
        });
        assert!(matches!(
            ret.unwrap().kind,
            ValueKind::Invoke {
                kind: InvokeKind::Interface,
                ..
            }
        ));
    }

    #[test]
    fn abstract_types_cannot_be_instantiated() {
        let err = analyze("interface I\nclass A\n    m() = I()\n").unwrap_err();
        assert!(err.message().contains("cannot instantiate abstract type"));
    }
}
