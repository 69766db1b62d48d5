use darling::ast::Data;
use darling::util::Ignored;
use darling::{FromDeriveInput, FromField};
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

use proc_macro::TokenStream;

#[derive(FromDeriveInput)]
#[darling(attributes(sud), supports(struct_named))]
struct LayoutInput {
    ident: syn::Ident,
    data: Data<Ignored, LayoutField>,
    /// Encoded size in bytes, checked against the sum of the field widths.
    size: usize,
}

#[derive(FromField)]
struct LayoutField {
    ident: Option<syn::Ident>,
    ty: syn::Type,
}

/// Derives `crate::endian::SudLayout` for a struct of SUD primitive fields.
///
/// Fields are laid out in declaration order with no padding; each field's
/// byte order comes from its type's `SudEncode` impl (u16 little-endian,
/// i32 PDP, u8 raw).
///
/// ```ignore
/// #[derive(SudLayout)]
/// #[sud(size = 6)]
/// struct Pair {
///     id: u16,
///     time: i32,
/// }
/// ```
#[proc_macro_derive(SudLayout, attributes(sud))]
pub fn derive_sud_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let layout = match LayoutInput::from_derive_input(&input) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(e.write_errors());
        }
    };

    let name = &layout.ident;
    let size = layout.size;

    let fields = match layout.data {
        Data::Struct(fields) => fields.fields,
        Data::Enum(_) => unreachable!("SudLayout can only be derived for structs"),
    };

    let idents: Vec<&syn::Ident> = fields.iter().filter_map(|f| f.ident.as_ref()).collect();
    let types: Vec<&syn::Type> = fields.iter().map(|f| &f.ty).collect();

    let expanded = quote! {
        const _: () = assert!(
            0 #( + <#types as crate::endian::SudEncode>::WIDTH )* == #size,
            "SudLayout size does not match the sum of field widths"
        );

        impl crate::endian::SudLayout for #name {
            const SIZE: usize = #size;

            fn write_sud(&self, dst: &mut Vec<u8>) {
                #( crate::endian::SudEncode::encode_sud(&self.#idents, dst); )*
            }

            fn read_sud(src: &[u8]) -> Self {
                debug_assert!(src.len() >= #size);
                let mut pos = 0usize;
                #(
                    let #idents = <#types as crate::endian::SudEncode>::decode_sud(&src[pos..]);
                    pos += <#types as crate::endian::SudEncode>::WIDTH;
                )*
                let _ = pos;
                Self { #( #idents ),* }
            }
        }
    };

    TokenStream::from(expanded)
}
