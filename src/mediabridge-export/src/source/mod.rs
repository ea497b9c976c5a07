//! Source interface: browsing and metadata access.

mod browse;

pub(crate) use browse::BrowseStreamer;

use crate::context::Context;
use crate::gateway::Dispatch;
use crate::interface::source::*;
use mediabridge_bus::{decode_metadata, encode_metadata, BusResult, MethodCall, Value};
use mediabridge_core::{
    BrowseId, BrowseRequest, ExtError, Metadata, SignalHandlerId, Source, SourceEvent,
};
use std::rc::Rc;

pub(crate) fn dispatch(
    ctx: &Context,
    source: &Rc<dyn Source>,
    browse: &Rc<BrowseStreamer>,
    call: &MethodCall,
) -> BusResult<Dispatch> {
    let to = call.reply_address();
    let mut args = call.args();

    match call.member.as_str() {
        BROWSE => {
            let request = BrowseRequest {
                object_id: args.next()?,
                recursive: args.next()?,
                filter: args.next_optional_string()?,
                sort_criteria: args.next_optional_string()?,
                metadata_keys: args.next()?,
                skip_count: args.next()?,
                item_count: args.next()?,
            };
            browse.start(source.as_ref(), request, to);
        }
        CANCEL_BROWSE => {
            let handle = BrowseId(args.next()?);
            browse.cancel(source.as_ref(), handle, to);
        }
        GET_METADATA => {
            let object_id: String = args.next()?;
            let keys: Vec<String> = args.next()?;
            let ctx = ctx.clone();
            let replied_id = object_id.clone();
            source.get_metadata(
                &object_id,
                &keys,
                Box::new(move |result| {
                    ctx.reply_result(to, result, |metadata| {
                        vec![Value::Str(replied_id), metadata_blob(&metadata)]
                    })
                }),
            );
        }
        GET_METADATAS => {
            let object_ids: Vec<String> = args.next()?;
            let keys: Vec<String> = args.next()?;
            let ctx = ctx.clone();
            source.get_metadatas(
                &object_ids,
                &keys,
                Box::new(move |found, error| {
                    let entries = found
                        .iter()
                        .map(|(id, metadata)| {
                            Value::Struct(vec![Value::str(id.as_str()), metadata_blob(metadata)])
                        })
                        .collect();
                    let mut reply = vec![Value::Array(entries)];
                    reply.extend(error_triple(error.as_ref()));
                    ctx.reply(to, reply);
                }),
            );
        }
        SET_METADATA => {
            let object_id: String = args.next()?;
            let blob: Vec<u8> = args.next()?;
            let metadata = decode_metadata(&blob)?;
            let ctx = ctx.clone();
            source.set_metadata(
                &object_id,
                metadata,
                Box::new(move |outcome| {
                    let mut reply = vec![
                        Value::Str(outcome.object_id),
                        Value::string_array(&outcome.failed_keys),
                    ];
                    reply.extend(error_triple(outcome.error.as_ref()));
                    ctx.reply(to, reply);
                }),
            );
        }
        CREATE_OBJECT => {
            let parent: String = args.next()?;
            let blob: Vec<u8> = args.next()?;
            let metadata = decode_metadata(&blob)?;
            let ctx = ctx.clone();
            source.create_object(
                &parent,
                metadata,
                Box::new(move |result| ctx.reply_result(to, result, |id| vec![Value::Str(id)])),
            );
        }
        DESTROY_OBJECT => {
            let object_id: String = args.next()?;
            let ctx = ctx.clone();
            source.destroy_object(
                &object_id,
                Box::new(move |result| ctx.reply_result(to, result, |id| vec![Value::Str(id)])),
            );
        }
        _ => return Ok(Dispatch::NotHandled),
    }
    Ok(Dispatch::Handled)
}

pub(crate) fn connect(ctx: &Context, source: &dyn Source, path: &str) -> SignalHandlerId {
    let ctx = ctx.clone();
    let path = path.to_owned();
    source.connect_source_events(Box::new(move |event| match event {
        SourceEvent::ContainerChanged { object_id } => ctx.emit(
            &path,
            INTERFACE,
            CONTAINER_CHANGED,
            vec![Value::str(object_id.as_str())],
        ),
        SourceEvent::MetadataChanged {
            object_id,
            metadata,
        } => ctx.emit(
            &path,
            INTERFACE,
            METADATA_CHANGED,
            vec![Value::str(object_id.as_str()), metadata_blob(metadata)],
        ),
    }))
}

/// Serialized metadata as a byte-array value.
pub(crate) fn metadata_blob(metadata: &Metadata) -> Value {
    match encode_metadata(metadata) {
        Ok(bytes) => Value::Bytes(bytes),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize metadata");
            Value::Bytes(Vec::new())
        }
    }
}

/// `(domain, code, message)`, empty when there is no error.
fn error_triple(error: Option<&ExtError>) -> [Value; 3] {
    match error {
        Some(err) => [
            Value::str(err.domain.as_str()),
            Value::I32(err.code),
            Value::str(err.message.as_str()),
        ],
        None => [Value::str(""), Value::I32(0), Value::str("")],
    }
}
