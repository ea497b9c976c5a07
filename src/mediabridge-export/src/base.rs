//! Methods and signals every exported extension carries.

use crate::activation::{ActivationTracker, Registration};
use crate::context::Context;
use crate::gateway::Dispatch;
use crate::interface::extension::*;
use crate::registry::ExportedObject;
use mediabridge_bus::{BusResult, ErrorReply, MethodCall, ReplyAddress, Value};
use mediabridge_core::{
    Extension, ExtensionEvent, ExtResult, SignalHandlerId, Variant, ACTIVATE_PROPERTY,
};

pub(crate) fn dispatch(
    ctx: &Context,
    activation: &ActivationTracker,
    object: &ExportedObject,
    call: &MethodCall,
) -> BusResult<Dispatch> {
    let extension = object.extension();
    let to = call.reply_address();
    let mut args = call.args();

    match call.member.as_str() {
        GET_PROPERTY => {
            let name: String = args.next()?;
            let requested = name.clone();
            let ctx = ctx.clone();
            extension.get_property(
                &requested,
                Box::new(move |result| {
                    ctx.reply_result(to, result, |value| {
                        vec![Value::Str(name), Value::variant(&value)]
                    })
                }),
            );
        }
        SET_PROPERTY => {
            let name: String = args.next()?;
            let value: Variant = args.next()?;
            if name == ACTIVATE_PROPERTY {
                set_activate(ctx, activation, object, &call.sender, value, to);
            } else {
                ctx.reply_result(to, extension.set_property(&name, value), |()| Vec::new());
            }
        }
        LIST_PROPERTIES => {
            let specs = extension.list_properties();
            let names: Vec<&str> = specs.iter().map(|spec| spec.name.as_str()).collect();
            let signatures: Vec<&str> = specs
                .iter()
                .map(|spec| spec.value_type.signature())
                .collect();
            ctx.reply(
                to,
                vec![Value::string_array(&names), Value::string_array(&signatures)],
            );
        }
        GET_NAME => ctx.reply(to, vec![Value::Str(extension.name())]),
        SET_NAME => {
            let name: String = args.next()?;
            extension.set_name(&name);
            ctx.reply(to, Vec::new());
        }
        _ => return Ok(Dispatch::NotHandled),
    }
    Ok(Dispatch::Handled)
}

/// `activate` is reference counted per calling peer. The native extension
/// sees `true` on every successful request and `false` only once the last
/// holder lets go.
fn set_activate(
    ctx: &Context,
    activation: &ActivationTracker,
    object: &ExportedObject,
    peer: &str,
    value: Variant,
    to: ReplyAddress,
) {
    let Some(active) = value.as_bool() else {
        ctx.reply_error(
            to,
            ErrorReply::InvalidArgs(format!("{ACTIVATE_PROPERTY} expects a boolean")),
        );
        return;
    };

    if active {
        match object
            .extension()
            .set_property(ACTIVATE_PROPERTY, Variant::Bool(true))
        {
            Ok(()) => {
                if let Registration::Added { .. } = activation.activate(peer, object.id) {
                    tracing::debug!(uuid = %object.uuid, %peer, "extension activated");
                }
                ctx.reply(to, Vec::new());
            }
            Err(err) => ctx.reply_error(to, err),
        }
        return;
    }

    if activation.deactivate(peer, object.id) {
        tracing::debug!(uuid = %object.uuid, "last activation released");
        ctx.reply_result(to, deactivate_natively(object.extension()), |()| Vec::new());
    } else {
        ctx.reply(to, Vec::new());
    }
}

pub(crate) fn deactivate_natively(extension: &dyn Extension) -> ExtResult<()> {
    extension.set_property(ACTIVATE_PROPERTY, Variant::Bool(false))
}

/// Forwards native extension events as bus signals on `path`.
pub(crate) fn connect(ctx: &Context, extension: &dyn Extension, path: &str) -> SignalHandlerId {
    let ctx = ctx.clone();
    let path = path.to_owned();
    extension.connect_extension_events(Box::new(move |event| match event {
        ExtensionEvent::PropertyChanged { name, value } => ctx.emit(
            &path,
            INTERFACE,
            PROPERTY_CHANGED,
            vec![Value::str(name.as_str()), Value::variant(value)],
        ),
        ExtensionEvent::NameChanged { name } => {
            ctx.emit(&path, INTERFACE, NAME_CHANGED, vec![Value::str(name.as_str())])
        }
        ExtensionEvent::Error { error } => ctx.emit(
            &path,
            INTERFACE,
            ERROR,
            vec![
                Value::str(error.domain.as_str()),
                Value::I32(error.code),
                Value::str(error.message.as_str()),
            ],
        ),
    }))
}
