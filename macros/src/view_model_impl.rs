use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{parse2, spanned::Spanned, Data, DeriveInput, Field, Index, Member, Result, Type};

pub fn derive_view_model(input: TokenStream) -> Result<TokenStream> {
    let input: DeriveInput = parse2(input)?;
    let Data::Struct(data) = &input.data else {
        bail!(
            Span::call_site(),
            "`#[derive(ViewModel)]` supports only structs."
        );
    };
    let fields: Vec<&Field> = data.fields.iter().collect();
    let member = find_vm_member(&fields)?;

    let ident = &input.ident;
    let name = ident.to_string();
    let (impl_g, type_g, where_clause) = input.generics.split_for_impl();
    let mut where_clause = where_clause.cloned().unwrap_or_else(|| syn::parse_quote!(where));
    where_clause.predicates.push(syn::parse_quote!(Self: 'static));

    Ok(quote! {
        impl #impl_g ::statevm::ViewModel for #ident #type_g #where_clause {
            fn vm(&self) -> &::statevm::Vm {
                &self.#member
            }
        }
        impl #impl_g ::core::cmp::PartialEq for #ident #type_g #where_clause {
            fn eq(&self, other: &Self) -> bool {
                self.#member == other.#member
            }
        }
        impl #impl_g ::core::cmp::Eq for #ident #type_g #where_clause {}
        impl #impl_g ::core::hash::Hash for #ident #type_g #where_clause {
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                ::core::hash::Hash::hash(&self.#member, state)
            }
        }
        impl #impl_g ::core::fmt::Debug for #ident #type_g #where_clause {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_tuple(#name).field(&self.#member).finish()
            }
        }
    })
}

fn find_vm_member(fields: &[&Field]) -> Result<Member> {
    let marked: Vec<usize> = (0..fields.len())
        .filter(|&i| fields[i].attrs.iter().any(|a| a.path().is_ident("vm")))
        .collect();
    for &i in &marked {
        for attr in &fields[i].attrs {
            if attr.path().is_ident("vm") {
                attr.meta.require_path_only()?;
            }
        }
    }
    let index = match marked[..] {
        [i] => i,
        [_, second, ..] => bail!(
            fields[second].span(),
            "only one field can be marked with `#[vm]`."
        ),
        [] => {
            let typed: Vec<usize> = (0..fields.len())
                .filter(|&i| is_vm_type(&fields[i].ty))
                .collect();
            match typed[..] {
                [i] => i,
                [] => bail!(
                    _,
                    "a view-model needs a field of type `Vm`. Add one or mark the field holding it with `#[vm]`."
                ),
                [_, second, ..] => bail!(
                    fields[second].span(),
                    "more than one field of type `Vm`. Mark the one to compare with `#[vm]`."
                ),
            }
        }
    };
    Ok(match &fields[index].ident {
        Some(ident) => Member::Named(ident.clone()),
        None => Member::Unnamed(Index {
            index: index as u32,
            span: fields[index].ty.span(),
        }),
    })
}

fn is_vm_type(ty: &Type) -> bool {
    let Type::Path(ty) = ty else {
        return false;
    };
    ty.qself.is_none()
        && ty
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "Vm" && s.arguments.is_empty())
}
