//! Descriptors for gRPC server reflection.
//!
//! Mirrors `packages/proto/currency/v1/currency.proto` so tools such as
//! `grpcurl` can discover `CurrencyService` without a local copy of the
//! contract. Enum values are taken from the generated [`Currencies`] type.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, OneofDescriptorProto,
    ServiceDescriptorProto,
};

use super::proto::currency::v1::Currencies;

const PACKAGE: &str = "currency.v1";
const FILE_NAME: &str = "currency/v1/currency.proto";
const TIMESTAMP_FILE: &str = "google/protobuf/timestamp.proto";

/// Contract file plus the well-known `Timestamp` it imports.
#[must_use]
pub fn file_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![timestamp_file(), currency_file()],
    }
}

fn qualified(name: &str) -> String {
    format!(".{PACKAGE}.{name}")
}

fn field(name: &str, number: i32, ty: Type, type_name: Option<String>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        type_name,
        ..FieldDescriptorProto::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..DescriptorProto::default()
    }
}

fn currencies_enum() -> EnumDescriptorProto {
    let value = (0..)
        .map_while(|number| Currencies::try_from(number).ok().map(|c| (number, c)))
        .map(|(number, currency)| EnumValueDescriptorProto {
            name: Some(currency.as_str_name().to_string()),
            number: Some(number),
            options: None,
        })
        .collect();

    EnumDescriptorProto {
        name: Some("Currencies".to_string()),
        value,
        ..EnumDescriptorProto::default()
    }
}

fn currency_file() -> FileDescriptorProto {
    let currency = || Some(qualified("Currencies"));

    let rate_request = message(
        "RateRequest",
        vec![
            field("base", 1, Type::Enum, currency()),
            field("destination", 2, Type::Enum, currency()),
        ],
    );
    let rate_response = message(
        "RateResponse",
        vec![
            field("base", 1, Type::Enum, currency()),
            field("destination", 2, Type::Enum, currency()),
            field("rate", 3, Type::Double, None),
            field(
                "updated_at",
                4,
                Type::Message,
                Some(".google.protobuf.Timestamp".to_string()),
            ),
        ],
    );
    let rate_error = message(
        "RateError",
        vec![
            field("request", 1, Type::Message, Some(qualified("RateRequest"))),
            field("code", 2, Type::Int32, None),
            field("message", 3, Type::String, None),
        ],
    );

    let mut streaming = message(
        "StreamingRateResponse",
        vec![
            field(
                "rate_response",
                1,
                Type::Message,
                Some(qualified("RateResponse")),
            ),
            field("error", 2, Type::Message, Some(qualified("RateError"))),
        ],
    );
    for f in &mut streaming.field {
        f.oneof_index = Some(0);
    }
    streaming.oneof_decl = vec![OneofDescriptorProto {
        name: Some("message".to_string()),
        options: None,
    }];

    let service = ServiceDescriptorProto {
        name: Some("CurrencyService".to_string()),
        method: vec![
            MethodDescriptorProto {
                name: Some("GetRate".to_string()),
                input_type: Some(qualified("RateRequest")),
                output_type: Some(qualified("RateResponse")),
                ..MethodDescriptorProto::default()
            },
            MethodDescriptorProto {
                name: Some("SubscribeRates".to_string()),
                input_type: Some(qualified("RateRequest")),
                output_type: Some(qualified("StreamingRateResponse")),
                client_streaming: Some(true),
                server_streaming: Some(true),
                ..MethodDescriptorProto::default()
            },
        ],
        options: None,
    };

    FileDescriptorProto {
        name: Some(FILE_NAME.to_string()),
        package: Some(PACKAGE.to_string()),
        dependency: vec![TIMESTAMP_FILE.to_string()],
        message_type: vec![rate_request, rate_response, rate_error, streaming],
        enum_type: vec![currencies_enum()],
        service: vec![service],
        syntax: Some("proto3".to_string()),
        ..FileDescriptorProto::default()
    }
}

fn timestamp_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(TIMESTAMP_FILE.to_string()),
        package: Some("google.protobuf".to_string()),
        message_type: vec![message(
            "Timestamp",
            vec![
                field("seconds", 1, Type::Int64, None),
                field("nanos", 2, Type::Int32, None),
            ],
        )],
        syntax: Some("proto3".to_string()),
        ..FileDescriptorProto::default()
    }
}
